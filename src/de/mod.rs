//! Type-directed deserialization.
//!
//! - [`types`] - type descriptors and the identifier registry
//! - [`legacy`] - static alias tables for renamed types and members
//! - [`value`] - the decoded value model
//! - [`overrides`] - custom decoders for fixed-layout domain records
//! - [`Deserializer`] - header-driven recursive descent over a reader

mod composite;
mod deserializer;
pub mod legacy;
pub mod overrides;
pub mod types;
pub mod value;

pub use deserializer::{Deserializer, Warning};
pub use legacy::{resolve_legacy_member, resolve_legacy_type, unknown_type_skip};
pub use overrides::{OverrideFn, OverrideRegistry, BYTE_DICTIONARY};
pub use types::{bare_name, Capability, ComponentKind, FieldSchema, Primitive, RecordSchema, TypeDesc, TypeKind, TypeRegistry};
pub use value::{
    Array, CatalogRef, Component, MaterialData, MaterialProperty, MeshData, Node, Record, SharedRef, TextureData,
    Transform, Value,
};
