//! Bounds-checked forward cursor over a byte slice.
//!
//! All fixed-width values are reinterpreted in the producing environment's
//! native layout (no byte swapping), so a stream is only portable between
//! machines that agree on endianness.

use bytemuck::Pod;

use crate::util::{Error, Result};

/// Largest byte length a string prefix may declare.
pub const MAX_STRING_LEN: u64 = i32::MAX as u64;

/// Take the next `n` bytes starting at `*pos`, advancing `pos`.
#[inline]
pub(crate) fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let start = *pos;
    let end = start.checked_add(n).filter(|&end| end <= data.len()).ok_or(Error::UnexpectedEof {
        offset: start,
        wanted: n,
        available: data.len().saturating_sub(start),
    })?;
    *pos = end;
    Ok(&data[start..end])
}

/// Reinterpret the next `size_of::<T>()` bytes as `T`.
#[inline]
pub(crate) fn read_pod<T: Pod>(data: &[u8], pos: &mut usize) -> Result<T> {
    let bytes = take(data, pos, std::mem::size_of::<T>())?;
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Read a 4-byte signed element count; negative counts are fatal.
#[inline]
pub(crate) fn read_count(data: &[u8], pos: &mut usize) -> Result<usize> {
    let at = *pos;
    let len: i32 = read_pod(data, pos)?;
    usize::try_from(len)
        .map_err(|_| Error::format(format!("negative element count {} at offset {}", len, at)))
}

/// Read a count-prefixed run of fixed-width elements.
pub(crate) fn read_pod_array<T: Pod>(data: &[u8], pos: &mut usize) -> Result<Vec<T>> {
    let len = read_count(data, pos)?;
    read_pod_run(data, pos, len)
}

/// Read `len` consecutive fixed-width elements.
pub(crate) fn read_pod_run<T: Pod>(data: &[u8], pos: &mut usize, len: usize) -> Result<Vec<T>> {
    let width = std::mem::size_of::<T>();
    let total = len.checked_mul(width).ok_or_else(|| {
        Error::format(format!("array of {} x {} bytes overflows", len, width))
    })?;
    let bytes = take(data, pos, total)?;
    Ok(bytes.chunks_exact(width).map(bytemuck::pod_read_unaligned).collect())
}

/// Decode a 7-bit-group variable-length unsigned integer.
///
/// Groups are little-endian; bit 7 of each byte is the continuation flag.
/// The decoded value must fit a signed 32-bit length.
pub(crate) fn read_7bit_len(data: &[u8], pos: &mut usize) -> Result<usize> {
    let start = *pos;
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let Some(&b) = data.get(*pos) else {
            return Err(Error::format(format!(
                "unterminated 7-bit length prefix at offset {}",
                start
            )));
        };
        *pos += 1;
        let group = u64::from(b & 0x7f);
        if group != 0 {
            if shift >= 32 || (group << shift) > MAX_STRING_LEN {
                return Err(Error::format(format!(
                    "7-bit length prefix at offset {} overflows a 32-bit length",
                    start
                )));
            }
            value |= group << shift;
            if value > MAX_STRING_LEN {
                return Err(Error::format(format!(
                    "invalid string length {} at offset {}",
                    value, start
                )));
            }
        }
        if b & 0x80 == 0 {
            return Ok(value as usize);
        }
        shift = shift.saturating_add(7);
    }
}

/// Decode a length-prefixed UTF-8 string.
///
/// Invalid sequences are replaced with U+FFFD; each call decodes its own
/// bytes only, so no partial character carries over between strings.
pub(crate) fn read_string(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_7bit_len(data, pos)?;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = take(data, pos, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// A borrowed cursor over an in-memory slice.
///
/// Used for the package container header, where the data is already mapped
/// and no pooled buffer is needed.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read<T: Pod>(&mut self) -> Result<T> {
        read_pod(self.data, &mut self.pos)
    }

    pub fn read_string(&mut self) -> Result<String> {
        read_string(self.data, &mut self.pos)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        take(self.data, &mut self.pos, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_bounds() {
        let data = [1u8, 2, 3];
        let mut pos = 1;
        assert_eq!(take(&data, &mut pos, 2).unwrap(), &[2, 3]);
        assert_eq!(pos, 3);
        let err = take(&data, &mut pos, 1).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { offset: 3, wanted: 1, available: 0 }));
    }

    #[test]
    fn test_7bit_boundaries() {
        let mut pos = 0;
        assert_eq!(read_7bit_len(&[0x7f], &mut pos).unwrap(), 127);
        let mut pos = 0;
        assert_eq!(read_7bit_len(&[0x80, 0x01], &mut pos).unwrap(), 128);
        assert_eq!(pos, 2);
        let mut pos = 0;
        assert_eq!(read_7bit_len(&[0x80, 0x80, 0x01], &mut pos).unwrap(), 16384);
    }

    #[test]
    fn test_7bit_redundant_groups() {
        let mut pos = 0;
        assert_eq!(read_7bit_len(&[0x85, 0x80, 0x80, 0x80, 0x80, 0x00], &mut pos).unwrap(), 5);
    }

    #[test]
    fn test_7bit_overflow() {
        let mut pos = 0;
        let err = read_7bit_len(&[0xff, 0xff, 0xff, 0xff, 0x0f], &mut pos).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_7bit_unterminated() {
        let mut pos = 0;
        let err = read_7bit_len(&[0x80, 0x80], &mut pos).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_negative_count() {
        let data = (-1i32).to_ne_bytes();
        let mut pos = 0;
        assert!(matches!(read_count(&data, &mut pos), Err(Error::Format(_))));
    }

    #[test]
    fn test_cursor_string() {
        let data = [3u8, b'a', b'b', b'c', 0];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(cur.read_string().unwrap(), "abc");
        assert_eq!(cur.read_string().unwrap(), "");
        assert_eq!(cur.remaining(), 0);
    }
}
