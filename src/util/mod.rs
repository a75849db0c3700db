//! Utility types shared by every layer.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math types from glam plus the fixed-layout records ([`Color`],
//!   [`BoneWeight`], [`Rect`])

mod error;
mod math;

pub use error::*;
pub use math::*;
