//! Wire-level decoding and encoding of package streams.
//!
//! - [`ByteCursor`] - borrowed cursor for in-memory headers
//! - [`PackageReader`] - pooled reader with typed, string, array and
//!   shared-reference reads
//! - [`PackageWriter`] - encoder for the same layout

mod cursor;
mod reader;
mod writer;

pub use cursor::{ByteCursor, MAX_STRING_LEN};
pub use reader::PackageReader;
pub use writer::PackageWriter;
