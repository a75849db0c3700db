//! Decoded value model.
//!
//! The deserializer produces a [`Value`] tree. Composite roots (nodes,
//! meshes, materials, textures) have dedicated shapes; every other record is
//! a [`Record`] of named fields in stream order.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as Json};
use smallvec::SmallVec;

use crate::core::SharedKind;
use crate::package::{Asset, SharedObject};
use crate::util::{BoneWeight, Color, Mat4, Quat, Rect, Vec2, Vec3, Vec4};

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value: absent reference, unsupported field or empty optional.
    Null,
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    String(String),
    DateTime(DateTime<Utc>),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(Color),
    Mat4(Mat4),
    Quat(Quat),
    Rect(Rect),
    Array(Array),
    /// Unmaterialized asset handle.
    Asset(Asset),
    /// Materialized texture, mesh or material shared by checksum.
    Shared(SharedRef),
    /// Named reference into a host catalog, not resolved here.
    Ref(CatalogRef),
    Record(Box<Record>),
    Node(Box<Node>),
    Mesh(Box<MeshData>),
    Material(Box<MaterialData>),
    Texture(Box<TextureData>),
}

/// Homogeneous arrays keep their element type; everything else is boxed.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    String(Vec<String>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    Color(Vec<Color>),
    Mat4(Vec<Mat4>),
    Quat(Vec<Quat>),
    Values(Vec<Value>),
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Vec2(v) => v.len(),
            Self::Vec3(v) => v.len(),
            Self::Vec4(v) => v.len(),
            Self::Color(v) => v.len(),
            Self::Mat4(v) => v.len(),
            Self::Quat(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shared object together with the checksum it was resolved from.
#[derive(Debug, Clone)]
pub struct SharedRef {
    pub kind: SharedKind,
    pub checksum: String,
    pub object: SharedObject,
}

impl SharedRef {
    /// True if both refer to the very same materialized object.
    pub fn same_object(&self, other: &SharedRef) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl PartialEq for SharedRef {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.checksum == other.checksum && self.same_object(other)
    }
}

/// Reference to a catalog entry by name.
///
/// Candidates are tried in order by whoever resolves the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRef {
    pub catalog: &'static str,
    pub candidates: SmallVec<[String; 2]>,
}

impl CatalogRef {
    pub fn new(catalog: &'static str, name: impl Into<String>) -> Self {
        let mut candidates = SmallVec::new();
        candidates.push(name.into());
        Self { catalog, candidates }
    }

    pub fn with_candidates(catalog: &'static str, candidates: impl IntoIterator<Item = String>) -> Self {
        Self { catalog, candidates: candidates.into_iter().collect() }
    }

    /// The first candidate name.
    pub fn name(&self) -> &str {
        self.candidates.first().map(String::as_str).unwrap_or("")
    }
}

/// A record of named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    /// Object name, for record kinds that carry one.
    pub name: Option<String>,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), name: None, fields: Vec::new() }
    }

    /// Builder-style field append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replace the field's value, appending it if the record lacks it.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }
}

/// A hierarchy node with its components.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub tag: String,
    pub layer: i32,
    pub active: bool,
    pub components: SmallVec<[Component; 4]>,
}

impl Node {
    /// The node's transform, if it has one.
    pub fn transform(&self) -> Option<&Transform> {
        self.components.iter().find_map(|c| match c {
            Component::Transform(t) => Some(t),
            _ => None,
        })
    }
}

/// Local pose of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE };
}

/// Closed set of node component kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Transform(Transform),
    MeshFilter {
        mesh: Option<SharedRef>,
    },
    MeshRenderer {
        materials: Vec<Option<SharedRef>>,
    },
    SkinnedMeshRenderer {
        materials: Vec<Option<SharedRef>>,
        mesh: Option<SharedRef>,
    },
    Animator {
        apply_root_motion: bool,
        update_mode: i32,
        culling_mode: i32,
    },
    /// Script component bound by name-matched fields.
    Scripted(Record),
}

impl Component {
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Transform(_) => "Transform",
            Self::MeshFilter { .. } => "MeshFilter",
            Self::MeshRenderer { .. } => "MeshRenderer",
            Self::SkinnedMeshRenderer { .. } => "SkinnedMeshRenderer",
            Self::Animator { .. } => "Animator",
            Self::Scripted(r) => &r.type_name,
        }
    }
}

/// Decoded mesh arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub colors: Vec<Color>,
    pub uv: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub bone_weights: Vec<BoneWeight>,
    pub bind_poses: Vec<Mat4>,
    /// Triangle index list per submesh.
    pub submeshes: Vec<Vec<i32>>,
}

/// One shader parameter of a material.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialProperty {
    Color(Color),
    Vector(Vec4),
    Float(f32),
    Texture(Option<SharedRef>),
}

/// Decoded material description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub shader: String,
    pub properties: Vec<(String, MaterialProperty)>,
}

/// Decoded texture: encoded image bytes plus sampling options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub linear: bool,
    pub aniso_level: i32,
    pub data: Vec<u8>,
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from! {
    bool => Bool, u8 => U8, i8 => I8, i16 => I16, u16 => U16, i32 => I32, u32 => U32,
    i64 => I64, u64 => U64, f32 => F32, String => String, Vec2 => Vec2, Vec3 => Vec3,
    Vec4 => Vec4, Color => Color, Mat4 => Mat4, Quat => Quat, Rect => Rect, Array => Array,
    Asset => Asset, SharedRef => Shared, CatalogRef => Ref,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Box::new(r))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_shared(&self) -> Option<&SharedRef> {
        match self {
            Value::Shared(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Render as JSON for inspection. Bulk numeric arrays are summarized.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(v) => json!(v),
            Value::U8(v) => json!(v),
            Value::I8(v) => json!(v),
            Value::I16(v) => json!(v),
            Value::U16(v) => json!(v),
            Value::I32(v) => json!(v),
            Value::U32(v) => json!(v),
            Value::I64(v) => json!(v),
            Value::U64(v) => json!(v),
            Value::F32(v) => float(*v),
            Value::String(s) => json!(s),
            Value::DateTime(t) => json!(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Vec2(v) => floats(&v.to_array()),
            Value::Vec3(v) => floats(&v.to_array()),
            Value::Vec4(v) => floats(&v.to_array()),
            Value::Color(c) => floats(&c.to_array()),
            Value::Quat(q) => floats(&q.to_array()),
            Value::Mat4(m) => floats(&m.to_cols_array()),
            Value::Rect(r) => json!({ "x": float(r.x), "y": float(r.y), "width": float(r.width), "height": float(r.height) }),
            Value::Array(a) => array_json(a),
            Value::Asset(a) => json!({ "asset": a.name(), "checksum": a.checksum(), "package": a.package().name() }),
            Value::Shared(s) => json!({ "shared": s.kind.name(), "checksum": s.checksum }),
            Value::Ref(r) => json!({ "catalog": r.catalog, "candidates": r.candidates.as_slice() }),
            Value::Record(r) => record_json(r),
            Value::Node(n) => json!({
                "node": n.name,
                "tag": n.tag,
                "layer": n.layer,
                "active": n.active,
                "components": n.components.iter().map(component_json).collect::<Vec<_>>(),
            }),
            Value::Mesh(m) => json!({
                "mesh": m.name,
                "vertices": m.vertices.len(),
                "colors": m.colors.len(),
                "uv": m.uv.len(),
                "normals": m.normals.len(),
                "tangents": m.tangents.len(),
                "bone_weights": m.bone_weights.len(),
                "bind_poses": m.bind_poses.len(),
                "submeshes": m.submeshes.iter().map(Vec::len).collect::<Vec<_>>(),
            }),
            Value::Material(m) => {
                let props: Map<String, Json> = m
                    .properties
                    .iter()
                    .map(|(name, p)| {
                        let v = match p {
                            MaterialProperty::Color(c) => floats(&c.to_array()),
                            MaterialProperty::Vector(v) => floats(&v.to_array()),
                            MaterialProperty::Float(f) => float(*f),
                            MaterialProperty::Texture(t) => shared_json(t.as_ref()),
                        };
                        (name.clone(), v)
                    })
                    .collect();
                json!({ "material": m.name, "shader": m.shader, "properties": props })
            }
            Value::Texture(t) => json!({
                "texture": t.name,
                "linear": t.linear,
                "aniso_level": t.aniso_level,
                "bytes": t.data.len(),
            }),
        }
    }
}

fn float(v: f32) -> Json {
    Json::from(f64::from(v))
}

fn floats(v: &[f32]) -> Json {
    Json::Array(v.iter().copied().map(float).collect())
}

fn shared_json(s: Option<&SharedRef>) -> Json {
    s.map_or(Json::Null, |s| json!({ "shared": s.kind.name(), "checksum": s.checksum }))
}

fn record_json(r: &Record) -> Json {
    let mut map = Map::new();
    map.insert("type".into(), json!(r.type_name));
    if let Some(name) = &r.name {
        map.insert("name".into(), json!(name));
    }
    let fields: Map<String, Json> = r.fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    map.insert("fields".into(), Json::Object(fields));
    Json::Object(map)
}

fn component_json(c: &Component) -> Json {
    match c {
        Component::Transform(t) => json!({
            "Transform": {
                "position": floats(&t.position.to_array()),
                "rotation": floats(&t.rotation.to_array()),
                "scale": floats(&t.scale.to_array()),
            }
        }),
        Component::MeshFilter { mesh } => json!({ "MeshFilter": shared_json(mesh.as_ref()) }),
        Component::MeshRenderer { materials } => json!({
            "MeshRenderer": materials.iter().map(|m| shared_json(m.as_ref())).collect::<Vec<_>>()
        }),
        Component::SkinnedMeshRenderer { materials, mesh } => json!({
            "SkinnedMeshRenderer": {
                "materials": materials.iter().map(|m| shared_json(m.as_ref())).collect::<Vec<_>>(),
                "mesh": shared_json(mesh.as_ref()),
            }
        }),
        Component::Animator { apply_root_motion, update_mode, culling_mode } => json!({
            "Animator": {
                "apply_root_motion": apply_root_motion,
                "update_mode": update_mode,
                "culling_mode": culling_mode,
            }
        }),
        Component::Scripted(r) => record_json(r),
    }
}

/// Arrays longer than this are printed as a length only.
const JSON_ARRAY_LIMIT: usize = 64;

fn array_json(a: &Array) -> Json {
    if a.len() > JSON_ARRAY_LIMIT {
        return json!({ "len": a.len() });
    }
    match a {
        Array::Bool(v) => json!(v),
        Array::U8(v) => json!(v),
        Array::I32(v) => json!(v),
        Array::F32(v) => floats(v),
        Array::String(v) => json!(v),
        Array::Vec2(v) => Json::Array(v.iter().map(|x| floats(&x.to_array())).collect()),
        Array::Vec3(v) => Json::Array(v.iter().map(|x| floats(&x.to_array())).collect()),
        Array::Vec4(v) => Json::Array(v.iter().map(|x| floats(&x.to_array())).collect()),
        Array::Color(v) => Json::Array(v.iter().map(|x| floats(&x.to_array())).collect()),
        Array::Mat4(v) => Json::Array(v.iter().map(|x| floats(&x.to_cols_array())).collect()),
        Array::Quat(v) => Json::Array(v.iter().map(|x| floats(&x.to_array())).collect()),
        Array::Values(v) => Json::Array(v.iter().map(Value::to_json).collect()),
    }
}
