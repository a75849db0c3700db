//! Package stream encoder.
//!
//! Produces the byte layout [`PackageReader`](super::PackageReader) consumes:
//! fixed-width values in native layout, 7-bit-prefixed UTF-8 strings,
//! `i32`-counted arrays and type headers. Used by the container builder and
//! by tools that synthesize package content.

use std::io::Write;

use byteorder::{ByteOrder, NativeEndian};
use bytemuck::Pod;

use crate::util::{BoneWeight, Color, Mat4, Quat, Result, Vec2, Vec3, Vec4};

/// In-memory encoder with chaining writes.
#[derive(Debug, Default, Clone)]
pub struct PackageWriter {
    buf: Vec<u8>,
}

macro_rules! write_scalar {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $width:expr, $func:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self, value: $ty) -> &mut Self {
            let mut bytes = [0u8; $width];
            NativeEndian::$func(&mut bytes, value);
            self.buf.extend_from_slice(&bytes);
            self
        }
    };
}

impl PackageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Copy the encoded bytes to a sink.
    pub fn write_to(&self, mut sink: impl Write) -> Result<()> {
        sink.write_all(&self.buf)?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(value as u8);
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.buf.push(value as u8);
        self
    }

    write_scalar!(write_u16, u16, 2, write_u16);
    write_scalar!(write_i16, i16, 2, write_i16);
    write_scalar!(write_u32, u32, 4, write_u32);
    write_scalar!(write_i32, i32, 4, write_i32);
    write_scalar!(write_u64, u64, 8, write_u64);
    write_scalar!(write_i64, i64, 8, write_i64);
    write_scalar!(write_f32, f32, 4, write_f32);

    /// Write any fixed-layout value as its raw bytes.
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(value));
        self
    }

    pub fn write_vec2(&mut self, v: Vec2) -> &mut Self {
        self.write_pod(&v)
    }

    pub fn write_vec3(&mut self, v: Vec3) -> &mut Self {
        self.write_pod(&v)
    }

    pub fn write_vec4(&mut self, v: Vec4) -> &mut Self {
        self.write_pod(&v)
    }

    pub fn write_color(&mut self, c: Color) -> &mut Self {
        self.write_pod(&c)
    }

    pub fn write_quat(&mut self, q: Quat) -> &mut Self {
        self.write_pod(&q)
    }

    pub fn write_mat4(&mut self, m: Mat4) -> &mut Self {
        self.write_pod(&m)
    }

    pub fn write_bone_weight(&mut self, w: BoneWeight) -> &mut Self {
        self.write_pod(&w)
    }

    /// Write a 7-bit-group variable-length unsigned integer.
    pub fn write_7bit_len(&mut self, mut value: u32) -> &mut Self {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
        self
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) -> &mut Self {
        self.write_7bit_len(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write raw bytes with no prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Write an `i32` count followed by the raw bytes.
    pub fn write_byte_array(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_i32(bytes.len() as i32);
        self.write_bytes(bytes)
    }

    /// Write an `i32` count followed by fixed-width elements.
    pub fn write_pod_array<T: Pod>(&mut self, items: &[T]) -> &mut Self {
        self.write_i32(items.len() as i32);
        self.buf.extend_from_slice(bytemuck::cast_slice(items));
        self
    }

    pub fn write_bool_array(&mut self, items: &[bool]) -> &mut Self {
        self.write_i32(items.len() as i32);
        for &b in items {
            self.write_bool(b);
        }
        self
    }

    pub fn write_string_array<S: AsRef<str>>(&mut self, items: &[S]) -> &mut Self {
        self.write_i32(items.len() as i32);
        for s in items {
            self.write_string(s.as_ref());
        }
        self
    }

    /// Type header for a value: presence flag then type identifier.
    pub fn write_header(&mut self, type_id: &str) -> &mut Self {
        self.write_bool(false);
        self.write_string(type_id)
    }

    /// Type header for a named field.
    pub fn write_named_header(&mut self, type_id: &str, name: &str) -> &mut Self {
        self.write_header(type_id);
        self.write_string(name)
    }

    /// Header with the "absent" flag set; terminates a value list.
    pub fn write_absent(&mut self) -> &mut Self {
        self.write_bool(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_7bit_lengths() {
        let mut w = PackageWriter::new();
        w.write_7bit_len(127);
        assert_eq!(w.as_bytes(), &[0x7f]);

        let mut w = PackageWriter::new();
        w.write_7bit_len(128);
        assert_eq!(w.as_bytes(), &[0x80, 0x01]);

        let mut w = PackageWriter::new();
        w.write_7bit_len(16384);
        assert_eq!(w.as_bytes(), &[0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_header_layout() {
        let mut w = PackageWriter::new();
        w.write_named_header("Int32", "m_x").write_absent();
        assert_eq!(w.as_bytes(), &[0, 5, b'I', b'n', b't', b'3', b'2', 3, b'm', b'_', b'x', 1]);
    }

    #[test]
    fn test_native_layout() {
        let mut w = PackageWriter::new();
        w.write_i32(0x0102_0304);
        assert_eq!(w.as_bytes(), &0x0102_0304i32.to_ne_bytes());
    }
}
