//! Type-directed recursive-descent deserializer.
//!
//! Every value in a package stream is preceded by a type header: an
//! "absent" flag and, when present, a type identifier (plus a field name
//! inside records). The header selects the decode path:
//!
//! ```text
//! ReadHeader -> Absent                  -> no value
//!            -> Resolved(type)          -> composite root | override | record | primitive
//!            -> Unresolved, skippable   -> skip fixed bytes, no value
//!            -> Unresolved              -> Error::UnknownType
//! ```
//!
//! Resolution order is: registry lookup, legacy type alias, fixed-size skip
//! table. Fatal conditions are errors; everything the decoder can step over
//! is a [`Warning`].

use std::fmt;
use std::sync::Arc;

use super::legacy::{resolve_legacy_member, resolve_legacy_type, unknown_type_skip};
use super::types::{Capability, FieldSchema, Primitive, RecordSchema, TypeDesc, TypeKind};
use super::value::{Array, Record, Value};
use crate::core::LoadSession;
use crate::package::{Package, VERSION_PACKAGE_ASSET_REFS};
use crate::stream::PackageReader;
use crate::util::{Error, Result};

/// A recovered decoding anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A value of this type has no decode strategy; it was dropped.
    UnsupportedType { type_name: String },
    /// A named field does not exist on its record type; the value was dropped.
    MissingTargetField { owner: String, field: String },
    /// A known type with no decoder was skipped by its fixed byte count.
    UnknownTypeSkipped { type_name: String, bytes: usize },
    /// A checksum resolved to no asset.
    ResolutionMiss { what: &'static str, checksum: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType { type_name } => {
                write!(f, "unsupported type for deserialization: [{}]", type_name)
            }
            Self::MissingTargetField { owner, field } => {
                write!(f, "type {} has no field '{}', value dropped", owner, field)
            }
            Self::UnknownTypeSkipped { type_name, bytes } => {
                write!(f, "unexpected type '{}' detected, skipping {} bytes", type_name, bytes)
            }
            Self::ResolutionMiss { what, checksum } => {
                write!(f, "{} with checksum '{}' not found", what, checksum)
            }
        }
    }
}

/// Outcome of reading a type header.
#[derive(Debug, Clone)]
pub(super) enum Header {
    /// The absent flag was set.
    Absent,
    /// An unresolvable but skippable type; its bytes were consumed.
    Skipped,
    Type(Arc<TypeDesc>),
}

/// Decodes values from one reader in the context of one package.
pub struct Deserializer<'r> {
    pub(super) reader: &'r mut PackageReader,
    package: Package,
    session: LoadSession,
    warnings: Vec<Warning>,
}

impl<'r> Deserializer<'r> {
    pub fn new(package: &Package, reader: &'r mut PackageReader) -> Self {
        let session = reader.session().clone();
        Self { reader, package: package.clone(), session, warnings: Vec::new() }
    }

    #[inline]
    pub fn reader(&mut self) -> &mut PackageReader {
        self.reader
    }

    #[inline]
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Format version of the package being decoded.
    #[inline]
    pub fn version(&self) -> u16 {
        self.package.version()
    }

    #[inline]
    pub fn session(&self) -> &LoadSession {
        &self.session
    }

    /// Anomalies recovered so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Log, count and remember a recovered anomaly.
    pub fn warn(&mut self, warning: Warning) {
        self.session.report(&warning);
        self.warnings.push(warning);
    }

    /// Decode the next top-level value.
    ///
    /// Returns `None` for an absent header (a list terminator) and for a
    /// skipped known-unknown type.
    pub fn deserialize_value(&mut self) -> Result<Option<Value>> {
        let Header::Type(ty) = self.read_header(false)?.0 else {
            return Ok(None);
        };
        tracing::trace!(ty = %ty, offset = self.reader.position(), "deserializing value");

        let value = match &ty.kind {
            TypeKind::Node => Value::Node(Box::new(self.read_node()?)),
            TypeKind::Mesh => Value::Mesh(Box::new(self.read_mesh_data()?)),
            TypeKind::Material => Value::Material(Box::new(self.read_material_data()?)),
            TypeKind::Texture => Value::Texture(Box::new(self.read_texture_data()?)),
            TypeKind::Record(schema) => self.deserialize_record(&ty, schema)?,
            TypeKind::Component(kind) => {
                return Err(Error::format(format!("component {} outside a node", kind.name())));
            }
            TypeKind::Primitive(_) | TypeKind::Enum(_) | TypeKind::Array(_) => {
                self.deserialize_single(&ty, None)?
            }
        };
        Ok(Some(value))
    }

    /// Read a header; `named` headers carry a field name after the type.
    pub(super) fn read_header(&mut self, named: bool) -> Result<(Header, String)> {
        if self.reader.read_bool()? {
            return Ok((Header::Absent, String::new()));
        }
        let identifier = self.reader.read_string()?;
        let name = if named { self.reader.read_string()? } else { String::new() };
        Ok((self.resolve_header(&identifier)?, name))
    }

    fn resolve_header(&mut self, identifier: &str) -> Result<Header> {
        if let Some(ty) = self.session.types().resolve(identifier) {
            return Ok(Header::Type(ty));
        }
        if let Some(current) = resolve_legacy_type(identifier) {
            tracing::warn!("unknown type detected, resolving '{}' as '{}'", identifier, current);
            if let Some(ty) = self.session.types().resolve(&current) {
                return Ok(Header::Type(ty));
            }
        }
        match unknown_type_skip(identifier) {
            Some(bytes) => {
                self.reader.skip(bytes)?;
                self.warn(Warning::UnknownTypeSkipped { type_name: identifier.to_string(), bytes });
                Ok(Header::Skipped)
            }
            None => Err(Error::UnknownType(identifier.to_string())),
        }
    }

    /// Run the registered override for `ty`, if any.
    pub fn try_override(&mut self, ty: &TypeDesc) -> Result<Option<Value>> {
        match self.session.overrides().get(ty.name()) {
            Some(decode) => decode(self),
            None => Ok(None),
        }
    }

    /// Top-level record: override first, then generic field binding.
    fn deserialize_record(&mut self, ty: &TypeDesc, schema: &RecordSchema) -> Result<Value> {
        if let Some(value) = self.try_override(ty)? {
            return Ok(value);
        }
        let name = self.reader.read_string()?;
        let mut record = empty_record(schema);
        if schema.capability == Capability::Scriptable {
            record.name = Some(name);
        }
        let count = self.reader.read_count()?;
        self.bind_fields(&mut record, schema, count)?;
        Ok(record.into())
    }

    /// Read `count` named fields and bind them into `record` by name.
    pub(super) fn bind_fields(&mut self, record: &mut Record, schema: &RecordSchema, count: usize) -> Result<()> {
        for _ in 0..count {
            let (header, field) = self.read_header(true)?;
            let Header::Type(ty) = header else {
                continue;
            };
            let target = bind_target(schema, &field);
            let expected = target.and_then(|f| self.session.types().resolve(&f.ty));
            let value = self.read_field_value(&ty, expected.as_deref())?;
            match target {
                Some(f) => record.set(&f.name, value),
                None => self.warn(Warning::MissingTargetField { owner: schema.name.clone(), field }),
            }
        }
        Ok(())
    }

    /// Decode a field value: arrays are count-prefixed, numeric scalars are
    /// read directly, everything else goes through the single-value path.
    pub fn read_field_value(&mut self, ty: &TypeDesc, expected: Option<&TypeDesc>) -> Result<Value> {
        match &ty.kind {
            TypeKind::Array(element) => self.read_array_field(element, expected),
            TypeKind::Primitive(p) | TypeKind::Enum(p) if p.is_numeric() => self.read_primitive(*p),
            _ => self.deserialize_single(ty, expected),
        }
    }

    fn read_array_field(&mut self, element: &TypeDesc, expected: Option<&TypeDesc>) -> Result<Value> {
        let count = self.reader.read_count()?;
        let array = match element.kind {
            TypeKind::Primitive(Primitive::F32) => Array::F32(self.reader.read_pod_run(count)?),
            TypeKind::Primitive(Primitive::I32) | TypeKind::Enum(Primitive::I32) => {
                Array::I32(self.reader.read_pod_run(count)?)
            }
            TypeKind::Primitive(Primitive::Vec2) => Array::Vec2(self.reader.read_pod_run(count)?),
            TypeKind::Primitive(Primitive::Vec3) => Array::Vec3(self.reader.read_pod_run(count)?),
            _ => {
                let mut values = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    values.push(self.deserialize_single(element, expected)?);
                }
                Array::Values(values)
            }
        };
        Ok(Value::Array(array))
    }

    /// Decode one value of a resolved type.
    ///
    /// Overrides get first refusal. Node and scriptable types are asset
    /// references decoded in full. Unsupported types yield [`Value::Null`]
    /// with a warning.
    pub fn deserialize_single(&mut self, ty: &TypeDesc, expected: Option<&TypeDesc>) -> Result<Value> {
        if let Some(value) = self.try_override(ty)? {
            return Ok(value);
        }
        match &ty.kind {
            TypeKind::Node => return self.read_asset_instance(),
            TypeKind::Record(schema) if schema.capability == Capability::Scriptable => {
                return self.read_asset_instance();
            }
            _ => {}
        }
        if self.version() < VERSION_PACKAGE_ASSET_REFS && expected.is_some_and(TypeDesc::is_asset) {
            return self.read_asset_value(false);
        }
        match &ty.kind {
            TypeKind::Primitive(p) | TypeKind::Enum(p) => self.read_primitive(*p),
            TypeKind::Array(element) => match self.read_primitive_array(element)? {
                Some(array) => Ok(Value::Array(array)),
                None => Ok(self.unsupported(ty)),
            },
            _ => Ok(self.unsupported(ty)),
        }
    }

    fn unsupported(&mut self, ty: &TypeDesc) -> Value {
        self.warn(Warning::UnsupportedType { type_name: ty.name().to_string() });
        Value::Null
    }

    /// Read one primitive with the matching cursor method.
    pub fn read_primitive(&mut self, p: Primitive) -> Result<Value> {
        let r = &mut *self.reader;
        Ok(match p {
            Primitive::Bool => Value::Bool(r.read_bool()?),
            Primitive::U8 => Value::U8(r.read_u8()?),
            Primitive::I8 => Value::I8(r.read_i8()?),
            Primitive::I16 => Value::I16(r.read_i16()?),
            Primitive::U16 => Value::U16(r.read_u16()?),
            Primitive::I32 => Value::I32(r.read_i32()?),
            Primitive::U32 => Value::U32(r.read_u32()?),
            Primitive::I64 => Value::I64(r.read_i64()?),
            Primitive::U64 => Value::U64(r.read_u64()?),
            Primitive::F32 => Value::F32(r.read_f32()?),
            Primitive::String => Value::String(r.read_string()?),
            Primitive::DateTime => Value::DateTime(r.read_datetime()?),
            Primitive::Vec2 => Value::Vec2(r.read_vec2()?),
            Primitive::Vec3 => Value::Vec3(r.read_vec3()?),
            Primitive::Vec4 => Value::Vec4(r.read_vec4()?),
            Primitive::Color => Value::Color(r.read_color()?),
            Primitive::Mat4 => Value::Mat4(r.read_mat4()?),
            Primitive::Quat => Value::Quat(r.read_quat()?),
            Primitive::Asset => return self.read_asset_value(true),
        })
    }

    fn read_primitive_array(&mut self, element: &TypeDesc) -> Result<Option<Array>> {
        let p = match element.kind {
            TypeKind::Primitive(p) | TypeKind::Enum(p) => p,
            _ => return Ok(None),
        };
        let r = &mut *self.reader;
        Ok(Some(match p {
            Primitive::Bool => Array::Bool(r.read_bool_array()?),
            Primitive::U8 => Array::U8(r.read_byte_array()?),
            Primitive::I32 => Array::I32(r.read_i32_array()?),
            Primitive::F32 => Array::F32(r.read_f32_array()?),
            Primitive::String => Array::String(r.read_string_array()?),
            Primitive::Vec2 => Array::Vec2(r.read_vec2_array()?),
            Primitive::Vec3 => Array::Vec3(r.read_vec3_array()?),
            Primitive::Vec4 => Array::Vec4(r.read_vec4_array()?),
            Primitive::Color => Array::Color(r.read_color_array()?),
            Primitive::Mat4 => Array::Mat4(r.read_mat4_array()?),
            Primitive::Quat => Array::Quat(r.read_quat_array()?),
            _ => return Ok(None),
        }))
    }

    /// Asset reference by checksum, optionally preferring this package.
    fn read_asset_value(&mut self, prefer_package: bool) -> Result<Value> {
        let checksum = self.reader.read_string()?;
        if checksum.is_empty() {
            return Ok(Value::Null);
        }
        let preferred = prefer_package.then_some(&self.package);
        match self.session.find_asset(&checksum, preferred) {
            Some(asset) => Ok(Value::Asset(asset)),
            None => {
                self.warn(Warning::ResolutionMiss { what: "asset", checksum });
                Ok(Value::Null)
            }
        }
    }

    /// Asset reference decoded in full.
    fn read_asset_instance(&mut self) -> Result<Value> {
        match self.read_asset_value(true)? {
            Value::Asset(asset) => self.session.instantiate(&asset),
            other => Ok(other),
        }
    }

    /// Decode an asset of this package found by checksum.
    ///
    /// An empty checksum is a null reference.
    pub fn instantiate_local(&mut self, checksum: &str) -> Result<Value> {
        if checksum.is_empty() {
            return Ok(Value::Null);
        }
        match self.package.find_by_checksum(checksum) {
            Some(asset) => self.session.instantiate(&asset),
            None => {
                self.warn(Warning::ResolutionMiss { what: "asset", checksum: checksum.to_string() });
                Ok(Value::Null)
            }
        }
    }
}

/// Field of `schema` a named header binds to, after legacy renames.
fn bind_target<'s>(schema: &'s RecordSchema, field: &str) -> Option<&'s FieldSchema> {
    schema.get(field).or_else(|| {
        let current = resolve_legacy_member(&schema.name, field)?;
        tracing::debug!("resolving member '{}' of {} as '{}'", field, schema.name, current);
        schema.get(current)
    })
}

/// A record with every declared field present and null.
pub(super) fn empty_record(schema: &RecordSchema) -> Record {
    Record {
        type_name: schema.name.clone(),
        name: None,
        fields: schema.fields.iter().map(|f| (f.name.clone(), Value::Null)).collect(),
    }
}
