//! Checksum-based asset resolution across packages.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Asset, Package};

/// Finds assets by content checksum.
pub trait AssetResolver: Send + Sync {
    fn find_by_checksum(&self, checksum: &str) -> Option<Asset>;
}

impl AssetResolver for Package {
    fn find_by_checksum(&self, checksum: &str) -> Option<Asset> {
        Package::find_by_checksum(self, checksum)
    }
}

impl<R: AssetResolver + ?Sized> AssetResolver for Arc<R> {
    fn find_by_checksum(&self, checksum: &str) -> Option<Asset> {
        (**self).find_by_checksum(checksum)
    }
}

/// Resolver that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl AssetResolver for NullResolver {
    fn find_by_checksum(&self, _checksum: &str) -> Option<Asset> {
        None
    }
}

/// The global set of loaded packages.
///
/// Lookups scan packages in registration order; the first match wins.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: RwLock<Vec<Package>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package. Registering the same package twice is a no-op.
    pub fn add(&self, package: Package) {
        let mut packages = self.packages.write();
        if !packages.iter().any(|p| p.ptr_eq(&package)) {
            tracing::debug!(package = package.name(), "registered package");
            packages.push(package);
        }
    }

    /// Unregister every package with the given name.
    pub fn remove(&self, name: &str) -> usize {
        let mut packages = self.packages.write();
        let before = packages.len();
        packages.retain(|p| p.name() != name);
        before - packages.len()
    }

    pub fn len(&self) -> usize {
        self.packages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.read().is_empty()
    }

    /// Snapshot of the registered packages.
    pub fn packages(&self) -> Vec<Package> {
        self.packages.read().clone()
    }

    /// Find a package by name.
    pub fn package(&self, name: &str) -> Option<Package> {
        self.packages.read().iter().find(|p| p.name() == name).cloned()
    }
}

impl AssetResolver for PackageRegistry {
    fn find_by_checksum(&self, checksum: &str) -> Option<Asset> {
        self.packages.read().iter().find_map(|p| p.find_by_checksum(checksum))
    }
}
