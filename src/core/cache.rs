//! Checksum-keyed caches of shared, already materialized objects.
//!
//! Textures, meshes and materials referenced by checksum are materialized
//! once and handed out again on later reads when the matching share setting
//! is on. The caches live in a [`LoadSession`](crate::core::LoadSession) and
//! are cleared by `close()` or by the pool's idle sweep.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::package::SharedObject;

/// Kind of object a shared cache holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharedKind {
    Texture,
    Mesh,
    Material,
}

impl SharedKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Texture => "texture",
            Self::Mesh => "mesh",
            Self::Material => "material",
        }
    }
}

impl fmt::Display for SharedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Thread-safe map from content checksum to a shared object.
///
/// Concurrent inserts for the same key are last-writer-wins; readers never
/// observe a torn entry.
pub struct ReferenceCache {
    entries: RwLock<HashMap<String, SharedObject>>,
}

impl ReferenceCache {
    /// Create an empty cache with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: RwLock::new(HashMap::with_capacity(capacity)) }
    }

    /// Get the cached object for a checksum.
    #[inline]
    pub fn get(&self, checksum: &str) -> Option<SharedObject> {
        self.entries.read().get(checksum).map(Arc::clone)
    }

    /// Insert or replace the object for a checksum.
    pub fn insert(&self, checksum: impl Into<String>, object: SharedObject) {
        self.entries.write().insert(checksum.into(), object);
    }

    /// Insert unless an entry exists; returns whichever object is cached.
    pub fn get_or_insert(&self, checksum: &str, object: SharedObject) -> SharedObject {
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(checksum.to_string()).or_insert(object))
    }

    #[inline]
    pub fn contains(&self, checksum: &str) -> bool {
        self.entries.read().contains_key(checksum)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

/// The three per-kind caches of a session.
#[derive(Default)]
pub struct SharedCaches {
    textures: ReferenceCache,
    meshes: ReferenceCache,
    materials: ReferenceCache,
}

impl SharedCaches {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            textures: ReferenceCache::with_capacity(capacity),
            meshes: ReferenceCache::with_capacity(capacity),
            materials: ReferenceCache::with_capacity(capacity),
        }
    }

    /// Cache for one kind.
    #[inline]
    pub fn get(&self, kind: SharedKind) -> &ReferenceCache {
        match kind {
            SharedKind::Texture => &self.textures,
            SharedKind::Mesh => &self.meshes,
            SharedKind::Material => &self.materials,
        }
    }

    pub fn clear(&self) {
        self.textures.clear();
        self.meshes.clear();
        self.materials.clear();
        tracing::debug!("shared object caches cleared");
    }

    /// Total entries across all kinds.
    pub fn len(&self) -> usize {
        self.textures.len() + self.meshes.len() + self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::DecodedObject;
    use crate::de::Value;

    fn object(v: i32) -> SharedObject {
        Arc::new(DecodedObject::new(Value::I32(v)))
    }

    #[test]
    fn test_cache_insert_get() {
        let cache = ReferenceCache::with_capacity(4);
        let obj = object(1);
        cache.insert("123", obj.clone());

        let hit = cache.get("123").unwrap();
        assert!(Arc::ptr_eq(&hit, &obj));
        assert!(cache.get("456").is_none());
    }

    #[test]
    fn test_cache_get_or_insert_keeps_first() {
        let cache = ReferenceCache::default();
        let first = object(1);
        let kept = cache.get_or_insert("k", first.clone());
        assert!(Arc::ptr_eq(&kept, &first));

        let kept = cache.get_or_insert("k", object(2));
        assert!(Arc::ptr_eq(&kept, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_caches_are_separate() {
        let caches = SharedCaches::with_capacity(8);
        caches.get(SharedKind::Mesh).insert("1", object(1));
        assert!(caches.get(SharedKind::Texture).get("1").is_none());
        assert_eq!(caches.len(), 1);

        caches.clear();
        assert!(caches.is_empty());
    }
}
