//! Math type re-exports and fixed-layout value types.
//!
//! Vectors, matrices and quaternions come from `glam`; the few record shapes
//! glam has no equivalent for are declared here with `#[repr(C)]` so they can
//! be reinterpreted straight out of a byte buffer.

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Linear RGBA color, four `f32` channels.
#[derive(Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// Skinning weights for one vertex: four weights then four bone indices.
#[derive(Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BoneWeight {
    pub weights: [f32; 4],
    pub bone_indices: [i32; 4],
}

impl fmt::Debug for BoneWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoneWeight")
            .field("weights", &self.weights)
            .field("bone_indices", &self.bone_indices)
            .finish()
    }
}

/// Axis-aligned rectangle (x, y, width, height), used by atlas sprites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}
