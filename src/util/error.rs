//! Error types for the asset package loader.

use thiserror::Error;

/// Main error type for package loading and deserialization.
///
/// Only fatal conditions are errors. Anomalies the deserializer can recover
/// from (unsupported fields, missing target fields, skipped known types) are
/// reported as [`Warning`](crate::de::Warning)s instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed length prefix, string, header or array count
    #[error("Format error: {0}")]
    Format(String),

    /// Type identifier could not be resolved and has no skip rule
    #[error("Unknown type to deserialize: {0}")]
    UnknownType(String),

    /// Caller passed an argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Cursor read past the end of the buffered stream
    #[error("Unexpected end of data at offset {offset}: wanted {wanted} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    /// Invalid magic bytes at start of a package container
    #[error("Invalid package file: expected CRAP magic bytes")]
    InvalidMagic,

    /// Package container version this loader cannot read
    #[error("Unsupported package version: {0}")]
    UnsupportedVersion(u16),

    /// Asset lookup by name or checksum failed where a result was required
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The native materializer rejected a decoded record
    #[error("Materialization failed: {0}")]
    Materialize(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (settings file) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for errors that mean the byte stream itself is malformed.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_) | Self::UnexpectedEof { .. } | Self::InvalidMagic)
    }
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::UnknownType("Foo, Bar".into());
        assert!(e.to_string().contains("Foo, Bar"));

        let e = Error::UnexpectedEof { offset: 12, wanted: 4, available: 2 };
        assert!(e.to_string().contains("12"));
        assert!(e.to_string().contains("4"));
        assert!(e.is_format());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_format());
    }
}
