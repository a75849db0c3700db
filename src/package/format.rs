//! Package container constants and asset kinds.
//!
//! ```text
//! +----------------------+
//! | Magic: "CRAP"        |  4 bytes
//! | Version              |  u16
//! | Package name         |  string
//! | Author               |  string
//! | Main asset name      |  string
//! | Asset count          |  i32
//! | Data offset          |  i64 (absolute)
//! +----------------------+
//! | Asset table          |  count x (name, checksum, i32 type,
//! |                      |           i64 offset, i64 size)
//! +----------------------+
//! | Data region          |  offsets relative to data offset
//! +----------------------+
//! ```
//!
//! Integers are in format-native layout; strings are 7-bit-length prefixed.

/// Container magic bytes.
pub const PACKAGE_MAGIC: &[u8; 4] = b"CRAP";

/// Newest container version this crate reads.
pub const LATEST_VERSION: u16 = 8;

/// Version that introduced path lane/traffic-light/yield arrays.
pub const VERSION_PATH_LANE_FLAGS: u16 = 5;

/// Version that introduced the texture anisotropic filtering level.
pub const VERSION_TEXTURE_ANISO: u16 = 6;

/// Version that introduced the lane prop "upgradable" flag.
pub const VERSION_LANE_PROP_UPGRADABLE: u16 = 8;

/// Last version where atlas textures are stored as raw pixels.
pub const VERSION_ATLAS_RAW_PIXELS: u16 = 3;

/// Versions before this store asset references without package context.
pub const VERSION_PACKAGE_ASSET_REFS: u16 = 3;

/// Kind tag stored for each asset in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetType {
    Assembly,
    Data,
    Object,
    Material,
    Texture,
    StaticMesh,
    Text,
    Locale,
    Other(i32),
}

impl AssetType {
    pub const fn from_i32(v: i32) -> Self {
        match v {
            1 => Self::Assembly,
            2 => Self::Data,
            3 => Self::Object,
            4 => Self::Material,
            5 => Self::Texture,
            6 => Self::StaticMesh,
            7 => Self::Text,
            8 => Self::Locale,
            other => Self::Other(other),
        }
    }

    pub const fn to_i32(self) -> i32 {
        match self {
            Self::Assembly => 1,
            Self::Data => 2,
            Self::Object => 3,
            Self::Material => 4,
            Self::Texture => 5,
            Self::StaticMesh => 6,
            Self::Text => 7,
            Self::Locale => 8,
            Self::Other(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_codes() {
        for v in -1..12 {
            assert_eq!(AssetType::from_i32(v).to_i32(), v);
        }
        assert_eq!(AssetType::from_i32(5), AssetType::Texture);
    }
}
