//! Boundary to the host's native object construction.
//!
//! The deserializer only decodes field data. Turning a decoded texture, mesh
//! or material record into a renderable object is the host's job, done
//! through [`NativeMaterializer`]. The result is shared behind an `Arc` so it
//! can sit in a session cache and be handed to many readers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::SharedKind;
use crate::de::Value;
use crate::package::Asset;
use crate::util::Result;

/// An object built by the host from decoded data.
pub trait NativeObject: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a materialized object.
pub type SharedObject = Arc<dyn NativeObject>;

/// Builds native objects from decoded records.
pub trait NativeMaterializer: Send + Sync {
    /// Materialize a decoded asset of the given kind.
    fn materialize(&self, kind: SharedKind, asset: &Asset, decoded: Value) -> Result<SharedObject>;
}

/// Native object that simply keeps the decoded value.
#[derive(Debug, Clone)]
pub struct DecodedObject {
    value: Value,
}

impl DecodedObject {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl NativeObject for DecodedObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Default materializer: wraps the decoded value as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainDecoded;

impl NativeMaterializer for RetainDecoded {
    fn materialize(&self, kind: SharedKind, asset: &Asset, decoded: Value) -> Result<SharedObject> {
        tracing::trace!(%kind, checksum = asset.checksum(), "retaining decoded object");
        Ok(Arc::new(DecodedObject::new(decoded)))
    }
}
