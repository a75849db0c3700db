//! Fixed-layout decoders for composite roots: nodes, meshes, materials and
//! textures.

use smallvec::SmallVec;

use super::deserializer::{empty_record, Deserializer, Header};
use super::types::{Capability, ComponentKind, TypeKind};
use super::value::{Component, MaterialData, MaterialProperty, MeshData, Node, SharedRef, TextureData, Transform};
use crate::package::VERSION_TEXTURE_ANISO;
use crate::util::{Error, Result};

/// Material property kind tags.
const PROP_COLOR: i32 = 0;
const PROP_VECTOR: i32 = 1;
const PROP_FLOAT: i32 = 2;
const PROP_TEXTURE: i32 = 3;

impl Deserializer<'_> {
    /// Node: name, tag, layer, active flag, then count-prefixed components.
    pub fn read_node(&mut self) -> Result<Node> {
        let name = self.reader.read_string()?;
        let tag = self.reader.read_string()?;
        let layer = self.reader.read_i32()?;
        let active = self.reader.read_bool()?;
        let count = self.reader.read_count()?;

        let mut components = SmallVec::new();
        for _ in 0..count {
            if let Some(component) = self.read_component()? {
                components.push(component);
            }
        }
        Ok(Node { name, tag, layer, active, components })
    }

    /// One component, selected by its own type header.
    ///
    /// An absent or skipped header yields no component. A resolved type
    /// that is neither a builtin component nor a behaviour is fatal.
    fn read_component(&mut self) -> Result<Option<Component>> {
        let Header::Type(ty) = self.read_header(false)?.0 else {
            return Ok(None);
        };
        let package = self.package().clone();
        let component = match &ty.kind {
            TypeKind::Component(ComponentKind::Transform) => Component::Transform(Transform {
                position: self.reader.read_vec3()?,
                rotation: self.reader.read_quat()?,
                scale: self.reader.read_vec3()?,
            }),
            TypeKind::Component(ComponentKind::MeshFilter) => Component::MeshFilter {
                mesh: self.reader.read_mesh(Some(&package))?,
            },
            TypeKind::Component(ComponentKind::MeshRenderer) => Component::MeshRenderer {
                materials: self.read_materials()?,
            },
            TypeKind::Component(ComponentKind::SkinnedMeshRenderer) => {
                let materials = self.read_materials()?;
                let mesh = self.reader.read_mesh(Some(&package))?;
                Component::SkinnedMeshRenderer { materials, mesh }
            }
            TypeKind::Component(ComponentKind::Animator) => Component::Animator {
                apply_root_motion: self.reader.read_bool()?,
                update_mode: self.reader.read_i32()?,
                culling_mode: self.reader.read_i32()?,
            },
            TypeKind::Record(schema) if schema.capability == Capability::Behaviour => {
                let mut record = empty_record(schema);
                let count = self.reader.read_count()?;
                self.bind_fields(&mut record, schema, count)?;
                Component::Scripted(record)
            }
            _ => return Err(Error::UnknownType(ty.name().to_string())),
        };
        Ok(Some(component))
    }

    fn read_materials(&mut self) -> Result<Vec<Option<SharedRef>>> {
        let package = self.package().clone();
        let count = self.reader.read_count()?;
        let mut materials = Vec::with_capacity(count.min(self.reader.remaining()));
        for _ in 0..count {
            materials.push(self.reader.read_material(Some(&package))?);
        }
        Ok(materials)
    }

    pub fn read_mesh_data(&mut self) -> Result<MeshData> {
        let r = &mut *self.reader;
        let mut mesh = MeshData {
            name: r.read_string()?,
            vertices: r.read_vec3_array()?,
            colors: r.read_color_array()?,
            uv: r.read_vec2_array()?,
            normals: r.read_vec3_array()?,
            tangents: r.read_vec4_array()?,
            bone_weights: r.read_bone_weight_array()?,
            bind_poses: r.read_mat4_array()?,
            submeshes: Vec::new(),
        };
        let count = r.read_count()?;
        mesh.submeshes.reserve(count.min(r.remaining()));
        for _ in 0..count {
            mesh.submeshes.push(r.read_i32_array()?);
        }
        Ok(mesh)
    }

    pub fn read_material_data(&mut self) -> Result<MaterialData> {
        let package = self.package().clone();
        let r = &mut *self.reader;
        let name = r.read_string()?;
        let shader = r.read_string()?;
        let count = r.read_count()?;

        let mut properties = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            let kind = r.read_i32()?;
            let prop = r.read_string()?;
            let value = match kind {
                PROP_COLOR => MaterialProperty::Color(r.read_color()?),
                PROP_VECTOR => MaterialProperty::Vector(r.read_vec4()?),
                PROP_FLOAT => MaterialProperty::Float(r.read_f32()?),
                PROP_TEXTURE => {
                    let is_null = r.read_bool()?;
                    MaterialProperty::Texture(if is_null { None } else { r.read_texture(Some(&package))? })
                }
                other => {
                    return Err(Error::format(format!(
                        "unknown property kind {} for '{}' in material '{}'",
                        other, prop, name
                    )));
                }
            };
            properties.push((prop, value));
        }
        Ok(MaterialData { name, shader, properties })
    }

    /// Texture: name, linear flag, anisotropic level (newer packages only),
    /// then the encoded image bytes.
    pub fn read_texture_data(&mut self) -> Result<TextureData> {
        let version = self.version();
        let r = &mut *self.reader;
        let name = r.read_string()?;
        let linear = r.read_bool()?;
        let aniso_level = if version >= VERSION_TEXTURE_ANISO { r.read_i32()? } else { 1 };
        let data = r.read_byte_array()?;
        Ok(TextureData { name, linear, aniso_level, data })
    }
}
