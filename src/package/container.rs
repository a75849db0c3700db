//! Package container: header, asset table and asset byte ranges.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use super::format::*;
use crate::stream::{ByteCursor, PackageWriter};
use crate::util::{Error, Result};

/// Backing storage of a package.
enum PackageData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl PackageData {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Mapped(m) => m,
        }
    }
}

/// One row of the asset table.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEntry {
    pub name: String,
    pub checksum: String,
    pub asset_type: AssetType,
    /// Offset relative to the data region.
    pub offset: u64,
    pub size: u64,
}

struct PackageInner {
    name: String,
    author: String,
    version: u16,
    main_asset: String,
    entries: Vec<AssetEntry>,
    by_checksum: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    data_offset: usize,
    data: PackageData,
}

/// An immutable, versioned collection of checksum-addressed assets.
///
/// Cloning is cheap; clones share the same storage.
#[derive(Clone)]
pub struct Package {
    inner: Arc<PackageInner>,
}

impl Package {
    /// Parse a container held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::parse(PackageData::Owned(bytes))
    }

    /// Open a container file with memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::UnexpectedEof { offset: 0, wanted: PACKAGE_MAGIC.len(), available: 0 });
        }
        // Safety: the file is opened read-only; concurrent truncation by
        // another process is outside what a loader can defend against.
        let mmap = unsafe { Mmap::map(&file) }?;
        tracing::debug!(path = %path.display(), size = mmap.len(), "mapped package");
        Self::parse(PackageData::Mapped(mmap))
    }

    fn parse(data: PackageData) -> Result<Self> {
        let bytes = data.bytes();
        let mut cur = ByteCursor::new(bytes);

        if cur.read_bytes(PACKAGE_MAGIC.len())? != PACKAGE_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version: u16 = cur.read()?;
        if version == 0 || version > LATEST_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let name = cur.read_string()?;
        let author = cur.read_string()?;
        let main_asset = cur.read_string()?;
        let count: i32 = cur.read()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::format(format!("negative asset count {}", count)))?;
        let data_offset: i64 = cur.read()?;
        let data_offset = usize::try_from(data_offset)
            .ok()
            .filter(|&off| off <= bytes.len())
            .ok_or_else(|| Error::format(format!("data offset {} outside package", data_offset)))?;

        let mut entries = Vec::with_capacity(count.min(cur.remaining()));
        for _ in 0..count {
            let name = cur.read_string()?;
            let checksum = cur.read_string()?;
            let asset_type = AssetType::from_i32(cur.read()?);
            let offset: i64 = cur.read()?;
            let size: i64 = cur.read()?;
            let (Ok(offset), Ok(size)) = (u64::try_from(offset), u64::try_from(size)) else {
                return Err(Error::format(format!("asset '{}' has a negative range", name)));
            };
            let end = (data_offset as u64).checked_add(offset).and_then(|s| s.checked_add(size));
            if end.map_or(true, |end| end > bytes.len() as u64) {
                return Err(Error::format(format!(
                    "asset '{}' range {}+{} exceeds package size {}",
                    name,
                    offset,
                    size,
                    bytes.len()
                )));
            }
            entries.push(AssetEntry { name, checksum, asset_type, offset, size });
        }
        if cur.position() > data_offset {
            return Err(Error::format("asset table overlaps the data region"));
        }

        let mut by_checksum = HashMap::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            by_checksum.entry(e.checksum.clone()).or_insert(i);
            by_name.entry(e.name.clone()).or_insert(i);
        }

        tracing::debug!(package = %name, version, assets = entries.len(), "parsed package header");

        Ok(Self {
            inner: Arc::new(PackageInner {
                name,
                author,
                version,
                main_asset,
                entries,
                by_checksum,
                by_name,
                data_offset,
                data,
            }),
        })
    }

    /// Package name, used as a namespace prefix for catalog lookups.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn author(&self) -> &str {
        &self.inner.author
    }

    /// Format version; gates version-dependent record fields.
    #[inline]
    pub fn version(&self) -> u16 {
        self.inner.version
    }

    /// Name of the distinguished main asset.
    #[inline]
    pub fn main_asset_name(&self) -> &str {
        &self.inner.main_asset
    }

    /// The main asset, if present in the table.
    pub fn main_asset(&self) -> Option<Asset> {
        self.find(&self.inner.main_asset)
    }

    /// Number of assets in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Find an asset by name.
    pub fn find(&self, name: &str) -> Option<Asset> {
        self.inner.by_name.get(name).map(|&index| self.asset(index))
    }

    /// Like [`Package::find`], but a missing asset is an error.
    pub fn get(&self, name: &str) -> Result<Asset> {
        self.find(name).ok_or_else(|| Error::AssetNotFound(format!("{} in package {}", name, self.name())))
    }

    /// Find an asset by content checksum within this package.
    pub fn find_by_checksum(&self, checksum: &str) -> Option<Asset> {
        self.inner.by_checksum.get(checksum).map(|&index| self.asset(index))
    }

    /// Iterate over all assets in table order.
    pub fn assets(&self) -> impl Iterator<Item = Asset> + '_ {
        (0..self.inner.entries.len()).map(move |i| self.asset(i))
    }

    fn asset(&self, index: usize) -> Asset {
        Asset { package: self.clone(), index }
    }

    /// True if both handles share storage.
    pub fn ptr_eq(&self, other: &Package) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start building a container in memory.
    pub fn builder(name: impl Into<String>) -> PackageBuilder {
        PackageBuilder::new(name)
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("assets", &self.inner.entries.len())
            .finish()
    }
}

/// Handle to one asset of a package.
#[derive(Clone)]
pub struct Asset {
    package: Package,
    index: usize,
}

impl Asset {
    #[inline]
    fn entry(&self) -> &AssetEntry {
        &self.package.inner.entries[self.index]
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.entry().name
    }

    #[inline]
    pub fn checksum(&self) -> &str {
        &self.entry().checksum
    }

    #[inline]
    pub fn asset_type(&self) -> AssetType {
        self.entry().asset_type
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.entry().size
    }

    /// The package this asset belongs to.
    #[inline]
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Raw bytes of the asset.
    pub fn bytes(&self) -> &[u8] {
        let e = self.entry();
        let start = self.package.inner.data_offset + e.offset as usize;
        &self.package.inner.data.bytes()[start..start + e.size as usize]
    }

    /// Open a seekable stream over the asset's bytes.
    pub fn open(&self) -> AssetStream {
        AssetStream { asset: self.clone(), pos: 0 }
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.package.ptr_eq(&other.package) && self.index == other.index
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("package", &self.package.name())
            .field("name", &self.name())
            .field("checksum", &self.checksum())
            .finish()
    }
}

/// `Read + Seek` view of one asset's byte range.
pub struct AssetStream {
    asset: Asset,
    pos: u64,
}

impl Read for AssetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.asset.bytes();
        let start = (self.pos as usize).min(bytes.len());
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for AssetStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.asset.size() as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => len + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of asset"));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

/// Builds a package container in memory.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    name: String,
    author: String,
    version: u16,
    main_asset: String,
    assets: Vec<(String, String, AssetType, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            version: LATEST_VERSION,
            main_asset: String::new(),
            assets: Vec::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn main_asset(mut self, name: impl Into<String>) -> Self {
        self.main_asset = name.into();
        self
    }

    /// Append an asset with its serialized content.
    pub fn asset(
        mut self,
        name: impl Into<String>,
        checksum: impl Into<String>,
        asset_type: AssetType,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.assets.push((name.into(), checksum.into(), asset_type, data.into()));
        self
    }

    /// Encode the container.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut table = PackageWriter::new();
        let mut offset = 0i64;
        for (name, checksum, asset_type, data) in &self.assets {
            table
                .write_string(name)
                .write_string(checksum)
                .write_i32(asset_type.to_i32())
                .write_i64(offset)
                .write_i64(data.len() as i64);
            offset += data.len() as i64;
        }

        let mut head = PackageWriter::new();
        head.write_bytes(PACKAGE_MAGIC)
            .write_u16(self.version)
            .write_string(&self.name)
            .write_string(&self.author)
            .write_string(&self.main_asset)
            .write_i32(self.assets.len() as i32);
        let data_offset = head.len() + 8 + table.len();
        head.write_i64(data_offset as i64).write_bytes(table.as_bytes());
        for (_, _, _, data) in &self.assets {
            head.write_bytes(data);
        }
        head.into_bytes()
    }

    /// Encode and parse back into a [`Package`].
    pub fn build(&self) -> Result<Package> {
        Package::from_bytes(self.to_bytes())
    }
}
