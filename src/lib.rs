//! # assetpack
//!
//! Loader for versioned binary asset packages.
//!
//! A package is a container of named, checksum-addressed assets. Each asset
//! is a stream of typed values: every value carries a type header, and the
//! decoder reconstructs object graphs from those headers alone, with custom
//! decoders for fixed-layout domain records, legacy alias fallback and
//! skipping of known-but-undecodable types. Textures, meshes and materials
//! referenced by checksum are materialized once and shared.
//!
//! ## Modules
//!
//! - [`util`] - Errors and fixed-layout math types
//! - [`stream`] - Byte cursor, pooled package reader and writer
//! - [`core`] - Buffer pool, shared-object caches, settings, load sessions
//! - [`package`] - Package container, asset handles and resolvers
//! - [`de`] - Type registry, overrides and the type-directed deserializer
//!
//! ## Example
//!
//! ```ignore
//! use assetpack::prelude::*;
//!
//! let package = Package::open("building.crp")?;
//! let session = LoadSession::builder()
//!     .settings(LoaderSettings::load_or_default())
//!     .resolver(std::sync::Arc::new(package.clone()))
//!     .build();
//!
//! if let Some(asset) = package.main_asset() {
//!     let value = session.instantiate(&asset)?;
//!     println!("{}", value.to_json());
//! }
//! session.close();
//! ```

pub mod util;
pub mod stream;
pub mod core;
pub mod package;
pub mod de;

// Re-export commonly used types
pub use util::{Error, Result};
pub use core::{LoadSession, LoaderSettings};
pub use package::{Asset, Package};
pub use de::{Value, Warning};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::core::{LoadSession, LoadSessionBuilder, LoaderSettings, SessionConfig, SettingsProvider};
    pub use crate::package::{Asset, AssetResolver, AssetType, Package, PackageRegistry};
    pub use crate::de::{Deserializer, OverrideRegistry, Record, TypeRegistry, Value, Warning};
    pub use crate::stream::{PackageReader, PackageWriter};
}
