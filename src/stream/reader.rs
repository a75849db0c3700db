//! Pooled, cursor-based reader for package streams.
//!
//! The whole input stream is drained into one leased buffer when the reader
//! is created; every later read is a bounds-checked slice of that buffer, so
//! decoding never touches I/O again.

use std::io::{Read, Seek, SeekFrom};

use bytemuck::Pod;
use chrono::{DateTime, NaiveDateTime, Utc};

use super::cursor::{read_7bit_len, read_count, read_pod, read_pod_array, read_pod_run, read_string, take};
use crate::core::{LoadSession, PooledBuffer, SharedKind};
use crate::de::SharedRef;
use crate::package::{Asset, Package};
use crate::util::{BoneWeight, Color, Error, Mat4, Quat, Result, Vec2, Vec3, Vec4};

/// Layouts accepted for textual date-times besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Sequential decoder over a fully buffered package stream.
pub struct PackageReader {
    session: LoadSession,
    buf: Option<PooledBuffer>,
    /// Number of valid bytes in `buf`.
    len: usize,
    pos: usize,
    stream: Option<Box<dyn Read + Send>>,
}

macro_rules! read_scalars {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty> {
                self.read_pod()
            }
        )*
    };
}

macro_rules! read_arrays {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<Vec<$ty>> {
                self.read_pod_array()
            }
        )*
    };
}

impl PackageReader {
    /// Drain `stream` into a pooled buffer leased from the session.
    pub fn new<R>(session: &LoadSession, mut stream: R) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        let start = stream.stream_position()?;
        let end = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(start))?;
        let size = usize::try_from(end.saturating_sub(start))
            .map_err(|_| Error::InvalidArgument(format!("stream of {} bytes too large", end)))?;

        let mut buf = session.pool().lease(size.max(1))?;
        let mut len = 0;
        while len < size {
            match stream.read(&mut buf[len..size]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        tracing::trace!(bytes = len, "buffered package stream");

        Ok(Self {
            session: session.clone(),
            buf: Some(buf),
            len,
            pos: 0,
            stream: Some(Box::new(stream)),
        })
    }

    /// The session this reader leases from.
    #[inline]
    pub fn session(&self) -> &LoadSession {
        &self.session
    }

    /// Current cursor offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Buffered stream length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }

    /// Release the buffer and close the input stream. Safe to call again.
    pub fn close(&mut self) {
        self.stream = None;
        if self.buf.take().is_some() {
            self.len = 0;
            self.pos = 0;
        }
    }

    #[inline]
    fn parts(&mut self) -> (&[u8], &mut usize) {
        let data = match &self.buf {
            Some(buf) => &buf[..self.len],
            None => &[][..],
        };
        (data, &mut self.pos)
    }

    fn read_pod<T: Pod>(&mut self) -> Result<T> {
        let (data, pos) = self.parts();
        read_pod(data, pos)
    }

    /// Count-prefixed run of fixed-width elements.
    pub fn read_pod_array<T: Pod>(&mut self) -> Result<Vec<T>> {
        let (data, pos) = self.parts();
        read_pod_array(data, pos)
    }

    /// `count` fixed-width elements with no prefix.
    pub fn read_pod_run<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let (data, pos) = self.parts();
        read_pod_run(data, pos, count)
    }

    read_scalars! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_vec2 => Vec2,
        read_vec3 => Vec3,
        read_vec4 => Vec4,
        read_color => Color,
        read_quat => Quat,
        read_mat4 => Mat4,
        read_bone_weight => BoneWeight,
    }

    read_arrays! {
        read_i32_array => i32,
        read_f32_array => f32,
        read_vec2_array => Vec2,
        read_vec3_array => Vec3,
        read_vec4_array => Vec4,
        read_color_array => Color,
        read_quat_array => Quat,
        read_mat4_array => Mat4,
        read_bone_weight_array => BoneWeight,
    }

    /// A boolean is one byte; any non-zero value is true.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Four-byte signed count; negative is a format error.
    pub fn read_count(&mut self) -> Result<usize> {
        let (data, pos) = self.parts();
        read_count(data, pos)
    }

    /// Bare 7-bit-group length.
    pub fn read_7bit_len(&mut self) -> Result<usize> {
        let (data, pos) = self.parts();
        read_7bit_len(data, pos)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let (data, pos) = self.parts();
        read_string(data, pos)
    }

    /// Copy the next `count` bytes into a fresh vector.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let (data, pos) = self.parts();
        Ok(take(data, pos, count)?.to_vec())
    }

    /// Advance past `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let (data, pos) = self.parts();
        take(data, pos, count).map(|_| ())
    }

    /// Count-prefixed byte blob.
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let count = self.read_count()?;
        self.read_bytes(count)
    }

    pub fn read_bool_array(&mut self) -> Result<Vec<bool>> {
        Ok(self.read_byte_array()?.into_iter().map(|b| b != 0).collect())
    }

    pub fn read_string_array(&mut self) -> Result<Vec<String>> {
        let count = self.read_count()?;
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(self.read_string()?);
        }
        Ok(out)
    }

    /// Textual timestamp; zone-less forms are taken as UTC.
    pub fn read_datetime(&mut self) -> Result<DateTime<Utc>> {
        let text = self.read_string()?;
        parse_datetime(&text)
            .ok_or_else(|| Error::format(format!("invalid date-time '{}'", text)))
    }

    pub fn read_texture(&mut self, preferred: Option<&Package>) -> Result<Option<SharedRef>> {
        self.read_shared(SharedKind::Texture, preferred)
    }

    pub fn read_mesh(&mut self, preferred: Option<&Package>) -> Result<Option<SharedRef>> {
        self.read_shared(SharedKind::Mesh, preferred)
    }

    pub fn read_material(&mut self, preferred: Option<&Package>) -> Result<Option<SharedRef>> {
        self.read_shared(SharedKind::Material, preferred)
    }

    /// Read a checksum and return the shared object for it.
    ///
    /// A checksum that resolves nowhere yields `None`.
    pub fn read_shared(&mut self, kind: SharedKind, preferred: Option<&Package>) -> Result<Option<SharedRef>> {
        let checksum = self.read_string()?;
        self.session.shared(kind, &checksum, preferred)
    }

    /// Read a checksum and resolve it to an asset handle without decoding.
    pub fn read_asset(&mut self, preferred: Option<&Package>) -> Result<Option<Asset>> {
        let checksum = self.read_string()?;
        Ok(self.session.find_asset(&checksum, preferred))
    }
}

impl Drop for PackageReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PackageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageReader")
            .field("len", &self.len)
            .field("pos", &self.pos)
            .field("open", &self.buf.is_some())
            .finish()
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::PackageWriter;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> PackageReader {
        PackageReader::new(&LoadSession::new(), Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_scalars_in_order() {
        let mut w = PackageWriter::new();
        w.write_u8(7).write_i16(-2).write_u32(9).write_i64(-5).write_f32(1.5).write_bool(true);
        let mut r = reader(w.into_bytes());
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.read_i64().unwrap(), -5);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.remaining(), 0);
        assert!(matches!(r.read_u8(), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_bool_is_nonzero_byte() {
        let mut r = reader(vec![0, 1, 0xff]);
        assert!(!r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
    }

    #[test]
    fn test_arrays() {
        let mut w = PackageWriter::new();
        w.write_pod_array(&[1.0f32, 2.0, 3.0])
            .write_bool_array(&[true, false])
            .write_string_array(&["a", "bc"])
            .write_byte_array(&[4, 5]);
        let mut r = reader(w.into_bytes());
        assert_eq!(r.read_f32_array().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(r.read_bool_array().unwrap(), vec![true, false]);
        assert_eq!(r.read_string_array().unwrap(), vec!["a", "bc"]);
        assert_eq!(r.read_byte_array().unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_negative_array_count() {
        let mut w = PackageWriter::new();
        w.write_i32(-3);
        let mut r = reader(w.into_bytes());
        assert!(matches!(r.read_vec3_array(), Err(Error::Format(_))));
    }

    #[test]
    fn test_datetime_forms() {
        let mut w = PackageWriter::new();
        w.write_string("2016-03-15T10:20:30.5Z")
            .write_string("2016-03-15T10:20:30")
            .write_string("03/15/2016 10:20:30")
            .write_string("yesterday");
        let mut r = reader(w.into_bytes());
        let a = r.read_datetime().unwrap();
        let b = r.read_datetime().unwrap();
        let c = r.read_datetime().unwrap();
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(b, c);
        assert!(matches!(r.read_datetime(), Err(Error::Format(_))));
    }

    #[test]
    fn test_close_returns_buffer_once() {
        let session = LoadSession::new();
        let mut r = PackageReader::new(&session, Cursor::new(vec![1u8, 2, 3])).unwrap();
        assert_eq!(session.pool().active(), 1);
        r.close();
        r.close();
        assert_eq!(session.pool().active(), 0);
        assert_eq!(session.pool().idle_count(), 1);
        assert!(r.read_u8().is_err());
        drop(r);
        assert_eq!(session.pool().idle_count(), 1);
    }

    #[test]
    fn test_empty_stream() {
        let mut r = reader(Vec::new());
        assert!(r.is_empty());
        assert!(r.read_bool().is_err());
    }

    #[test]
    fn test_stream_read_from_current_position() {
        let mut cur = Cursor::new(vec![9u8, 1, 2]);
        cur.set_position(1);
        let mut r = PackageReader::new(&LoadSession::new(), cur).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.read_u8().unwrap(), 1);
    }
}
