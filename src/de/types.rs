//! Type descriptors and the registry that resolves stream type identifiers.
//!
//! Identifiers in a stream are assembly-qualified names such as
//! `"UnityEngine.Vector3, UnityEngine"` or
//! `"MapMetaData, Assembly-CSharp, Version=0.0.0.0, Culture=neutral, PublicKeyToken=null"`.
//! [`TypeRegistry::resolve`] tries the exact identifier, then the bare type
//! name before the assembly qualifier, then an `X[]` array of a known `X`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Fixed-layout and textual value kinds read directly by the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    String,
    DateTime,
    Vec2,
    Vec3,
    Vec4,
    Color,
    Mat4,
    Quat,
    /// Checksum reference to an asset.
    Asset,
}

impl Primitive {
    pub const ALL: [Primitive; 19] = [
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::String,
        Self::DateTime,
        Self::Vec2,
        Self::Vec3,
        Self::Vec4,
        Self::Color,
        Self::Mat4,
        Self::Quat,
        Self::Asset,
    ];

    /// Canonical short name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "byte",
            Self::I8 => "sbyte",
            Self::I16 => "short",
            Self::U16 => "ushort",
            Self::I32 => "int",
            Self::U32 => "uint",
            Self::I64 => "long",
            Self::U64 => "ulong",
            Self::F32 => "float",
            Self::String => "string",
            Self::DateTime => "DateTime",
            Self::Vec2 => "Vector2",
            Self::Vec3 => "Vector3",
            Self::Vec4 => "Vector4",
            Self::Color => "Color",
            Self::Mat4 => "Matrix4x4",
            Self::Quat => "Quaternion",
            Self::Asset => "Asset",
        }
    }

    /// Qualified names the stream uses for this kind.
    const fn qualified(self) -> &'static [&'static str] {
        match self {
            Self::Bool => &["System.Boolean"],
            Self::U8 => &["System.Byte"],
            Self::I8 => &["System.SByte"],
            Self::I16 => &["System.Int16"],
            Self::U16 => &["System.UInt16"],
            Self::I32 => &["System.Int32"],
            Self::U32 => &["System.UInt32"],
            Self::I64 => &["System.Int64"],
            Self::U64 => &["System.UInt64"],
            Self::F32 => &["System.Single"],
            Self::String => &["System.String"],
            Self::DateTime => &["System.DateTime"],
            Self::Vec2 => &["UnityEngine.Vector2"],
            Self::Vec3 => &["UnityEngine.Vector3"],
            Self::Vec4 => &["UnityEngine.Vector4"],
            Self::Color => &["UnityEngine.Color"],
            Self::Mat4 => &["UnityEngine.Matrix4x4"],
            Self::Quat => &["UnityEngine.Quaternion"],
            Self::Asset => &["ColossalFramework.Packaging.Package+Asset", "Package+Asset"],
        }
    }

    /// True for kinds read by the scalar type-code switch.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::U8
                | Self::I8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
                | Self::F32
        )
    }
}

/// Closed set of node component kinds with fixed layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    MeshFilter,
    MeshRenderer,
    SkinnedMeshRenderer,
    Animator,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        Self::Transform,
        Self::MeshFilter,
        Self::MeshRenderer,
        Self::SkinnedMeshRenderer,
        Self::Animator,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Transform => "Transform",
            Self::MeshFilter => "MeshFilter",
            Self::MeshRenderer => "MeshRenderer",
            Self::SkinnedMeshRenderer => "SkinnedMeshRenderer",
            Self::Animator => "Animator",
        }
    }
}

/// What a record type can do, which decides its decode path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Plain data record; generic binding discards the leading name.
    Plain,
    /// Named configuration object; keeps its name. Fields of this kind are
    /// asset references.
    Scriptable,
    /// Script component attachable to a node.
    Behaviour,
}

/// One declared field of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    /// Type identifier of the declared field type.
    pub ty: String,
}

/// Field table of a record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSchema {
    pub name: String,
    pub capability: Capability,
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self { name: name.into(), capability, fields: Vec::new() }
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push(FieldSchema { name: name.into(), ty: ty.into() });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Resolved target type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    /// Hierarchy node with components.
    Node,
    Mesh,
    Material,
    /// Texture or decoded image.
    Texture,
    Component(ComponentKind),
    Primitive(Primitive),
    /// Enumeration stored as its underlying integer.
    Enum(Primitive),
    Array(Arc<TypeDesc>),
    Record(Arc<RecordSchema>),
}

/// A named, resolved type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDesc {
    pub name: Arc<str>,
    pub kind: TypeKind,
}

impl TypeDesc {
    pub fn new(name: impl Into<Arc<str>>, kind: TypeKind) -> Self {
        Self { name: name.into(), kind }
    }

    pub fn array_of(element: Arc<TypeDesc>) -> Self {
        Self::new(format!("{}[]", element.name), TypeKind::Array(element))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(_))
    }

    pub fn is_asset(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(Primitive::Asset))
    }

    pub fn record(&self) -> Option<&RecordSchema> {
        match &self.kind {
            TypeKind::Record(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn capability(&self) -> Option<Capability> {
        self.record().map(|r| r.capability)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The type identifier with its assembly qualifier removed.
///
/// Commas inside generic argument brackets are not separators.
pub fn bare_name(identifier: &str) -> &str {
    let mut depth = 0i32;
    for (i, c) in identifier.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => return identifier[..i].trim_end(),
            _ => {}
        }
    }
    identifier.trim_end()
}

/// Registry mapping identifiers to descriptors.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDesc>>,
}

impl TypeRegistry {
    /// A registry with no types at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Primitives, composite roots, components and the builtin domain types.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        for p in Primitive::ALL {
            reg.register(TypeDesc::new(p.name(), TypeKind::Primitive(p)), p.qualified());
        }
        reg.register(TypeDesc::new("Node", TypeKind::Node), &["UnityEngine.GameObject", "GameObject"]);
        reg.register(TypeDesc::new("Mesh", TypeKind::Mesh), &["UnityEngine.Mesh"]);
        reg.register(TypeDesc::new("Material", TypeKind::Material), &["UnityEngine.Material"]);
        reg.register(
            TypeDesc::new("Texture2D", TypeKind::Texture),
            &["UnityEngine.Texture2D", "Image", "ColossalFramework.Importers.Image"],
        );
        for c in ComponentKind::ALL {
            let qualified = format!("UnityEngine.{}", c.name());
            reg.register(TypeDesc::new(c.name(), TypeKind::Component(c)), &[qualified.as_str()]);
        }
        super::overrides::register_types(&mut reg);
        super::legacy::register_metadata_types(&mut reg);
        reg
    }

    /// Register a descriptor under its name and extra aliases.
    pub fn register(&mut self, desc: TypeDesc, aliases: &[&str]) -> Arc<TypeDesc> {
        let desc = Arc::new(desc);
        for alias in aliases {
            self.types.insert((*alias).to_string(), desc.clone());
        }
        self.types.insert(desc.name.to_string(), desc.clone());
        desc
    }

    /// Register a record type.
    pub fn register_record(&mut self, schema: RecordSchema) -> Arc<TypeDesc> {
        let name = schema.name.clone();
        self.register(TypeDesc::new(name, TypeKind::Record(Arc::new(schema))), &[])
    }

    /// Register an enumeration stored as `underlying`.
    pub fn register_enum(&mut self, name: &str, underlying: Primitive) -> Arc<TypeDesc> {
        self.register(TypeDesc::new(name, TypeKind::Enum(underlying)), &[])
    }

    /// Make `alias` resolve like `target`. Returns false if `target` is unknown.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        match self.types.get(target).cloned() {
            Some(desc) => {
                self.types.insert(alias.to_string(), desc);
                true
            }
            None => false,
        }
    }

    /// Exact lookup.
    pub fn get(&self, name: &str) -> Option<Arc<TypeDesc>> {
        self.types.get(name).cloned()
    }

    /// Resolve a stream identifier.
    pub fn resolve(&self, identifier: &str) -> Option<Arc<TypeDesc>> {
        if let Some(desc) = self.types.get(identifier) {
            return Some(desc.clone());
        }
        let bare = bare_name(identifier);
        if let Some(desc) = self.types.get(bare) {
            return Some(desc.clone());
        }
        let element = bare.strip_suffix("[]")?;
        let element = self.resolve(element)?;
        Some(Arc::new(TypeDesc::array_of(element)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("UnityEngine.Vector3, UnityEngine"), "UnityEngine.Vector3");
        assert_eq!(bare_name("Foo"), "Foo");
        assert_eq!(
            bare_name("Dictionary`2[[System.String, mscorlib],[System.Byte[], mscorlib]], mscorlib"),
            "Dictionary`2[[System.String, mscorlib],[System.Byte[], mscorlib]]"
        );
    }

    #[test]
    fn test_resolve_primitives() {
        let reg = TypeRegistry::builtin();
        let a = reg.resolve("System.Int32, mscorlib, Version=2.0.0.0").unwrap();
        assert_eq!(a.kind, TypeKind::Primitive(Primitive::I32));
        assert_eq!(reg.resolve("int").unwrap(), a);
        assert_eq!(reg.resolve("UnityEngine.GameObject, UnityEngine").unwrap().kind, TypeKind::Node);
    }

    #[test]
    fn test_resolve_arrays() {
        let reg = TypeRegistry::builtin();
        let a = reg.resolve("System.Single[], mscorlib").unwrap();
        match &a.kind {
            TypeKind::Array(elem) => assert_eq!(elem.kind, TypeKind::Primitive(Primitive::F32)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(reg.resolve("NoSuchType[]").is_none());
    }

    #[test]
    fn test_register_record_and_alias() {
        let mut reg = TypeRegistry::empty();
        reg.register_record(RecordSchema::new("Thing", Capability::Plain).field("m_x", "float"));
        assert!(reg.alias("Old+Thing", "Thing"));
        assert!(!reg.alias("X", "Missing"));
        let t = reg.resolve("Old+Thing, Assembly-CSharp").unwrap();
        assert_eq!(t.record().unwrap().get("m_x").unwrap().ty, "float");
    }
}
