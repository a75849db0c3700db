//! Explicit load context.
//!
//! A [`LoadSession`] owns everything readers and deserializers share: the
//! buffer pool, the shared-object caches, the settings and resolver
//! collaborators, the type and override registries and the statistics.
//! Cloning is cheap and every clone refers to the same session.

use std::io::{Read, Seek};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use rayon::prelude::*;
use serde::Serialize;

use super::{BufferPool, LoaderSettings, SessionConfig, SettingsProvider, SharedCaches, SharedKind};
use crate::de::{Deserializer, OverrideRegistry, SharedRef, TypeRegistry, Value, Warning};
use crate::package::{Asset, AssetResolver, NativeMaterializer, NullResolver, Package, RetainDecoded};
use crate::stream::PackageReader;
use crate::util::Result;

/// Running counters of one session.
#[derive(Debug, Default)]
struct Counters {
    assets_decoded: AtomicU64,
    shared_hits: AtomicU64,
    shared_materialized: AtomicU64,
    resolution_misses: AtomicU64,
    unsupported_fields: AtomicU64,
    missing_fields: AtomicU64,
    skipped_unknown: AtomicU64,
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub assets_decoded: u64,
    pub shared_hits: u64,
    pub shared_materialized: u64,
    pub resolution_misses: u64,
    pub unsupported_fields: u64,
    pub missing_fields: u64,
    pub skipped_unknown: u64,
}

impl LoadStats {
    /// Total recovered anomalies.
    pub fn warnings(&self) -> u64 {
        self.resolution_misses + self.unsupported_fields + self.missing_fields + self.skipped_unknown
    }
}

struct SessionInner {
    pool: Arc<BufferPool>,
    caches: Arc<SharedCaches>,
    settings: Arc<dyn SettingsProvider>,
    resolver: Arc<dyn AssetResolver>,
    materializer: Arc<dyn NativeMaterializer>,
    types: TypeRegistry,
    overrides: OverrideRegistry,
    counters: Counters,
}

/// Shared context for a batch of package loads.
#[derive(Clone)]
pub struct LoadSession {
    inner: Arc<SessionInner>,
}

impl Default for LoadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSession {
    /// Session with default settings, no global resolver and builtin types.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> LoadSessionBuilder {
        LoadSessionBuilder::default()
    }

    #[inline]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.inner.pool
    }

    #[inline]
    pub fn caches(&self) -> &SharedCaches {
        &self.inner.caches
    }

    #[inline]
    pub fn settings(&self) -> &dyn SettingsProvider {
        &*self.inner.settings
    }

    #[inline]
    pub fn resolver(&self) -> &dyn AssetResolver {
        &*self.inner.resolver
    }

    #[inline]
    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    #[inline]
    pub fn overrides(&self) -> &OverrideRegistry {
        &self.inner.overrides
    }

    /// Create a reader over a stream, draining it into a pooled buffer.
    pub fn reader<R>(&self, stream: R) -> Result<PackageReader>
    where
        R: Read + Seek + Send + 'static,
    {
        PackageReader::new(self, stream)
    }

    /// Decode the first value of `stream` in the context of `package`.
    pub fn deserialize_stream<R>(&self, package: &Package, stream: R) -> Result<Option<Value>>
    where
        R: Read + Seek + Send + 'static,
    {
        let mut reader = self.reader(stream)?;
        let value = Deserializer::new(package, &mut reader).deserialize_value();
        reader.close();
        value
    }

    /// Decode one asset.
    pub fn deserialize_asset(&self, asset: &Asset) -> Result<Option<Value>> {
        tracing::debug!(asset = asset.name(), checksum = asset.checksum(), "deserializing asset");
        let value = self.deserialize_stream(asset.package(), asset.open())?;
        self.inner.counters.assets_decoded.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Decode an asset, mapping "no value" to [`Value::Null`].
    pub fn instantiate(&self, asset: &Asset) -> Result<Value> {
        Ok(self.deserialize_asset(asset)?.unwrap_or(Value::Null))
    }

    /// Decode many assets in parallel; results keep the input order.
    pub fn deserialize_all(&self, assets: &[Asset]) -> Vec<Result<Option<Value>>> {
        assets.par_iter().map(|asset| self.deserialize_asset(asset)).collect()
    }

    /// Resolve a checksum: preferred package first, then the global resolver.
    pub fn find_asset(&self, checksum: &str, preferred: Option<&Package>) -> Option<Asset> {
        preferred
            .and_then(|p| p.find_by_checksum(checksum))
            .or_else(|| self.inner.resolver.find_by_checksum(checksum))
    }

    fn sharing(&self, kind: SharedKind) -> bool {
        let settings = self.settings();
        match kind {
            SharedKind::Texture => settings.share_textures(),
            SharedKind::Mesh => settings.share_meshes(),
            SharedKind::Material => settings.share_materials(),
        }
    }

    /// Shared object for a checksum, materializing and caching it on a miss.
    ///
    /// The cache is consulted only when sharing is enabled for `kind`, but is
    /// always populated. With sharing on, a concurrent reader that cached the
    /// same checksum first wins and its object is returned. An empty checksum
    /// is a null reference.
    pub fn shared(&self, kind: SharedKind, checksum: &str, preferred: Option<&Package>) -> Result<Option<SharedRef>> {
        if checksum.is_empty() {
            return Ok(None);
        }
        let cache = self.inner.caches.get(kind);
        let sharing = self.sharing(kind);
        if sharing {
            if let Some(object) = cache.get(checksum) {
                self.inner.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%kind, checksum, "shared cache hit");
                return Ok(Some(SharedRef { kind, checksum: checksum.to_string(), object }));
            }
        }

        let Some(asset) = self.find_asset(checksum, preferred) else {
            self.report(&Warning::ResolutionMiss { what: kind.name(), checksum: checksum.to_string() });
            return Ok(None);
        };
        let decoded = self.instantiate(&asset)?;
        let mut object = self.inner.materializer.materialize(kind, &asset, decoded)?;
        self.inner.counters.shared_materialized.fetch_add(1, Ordering::Relaxed);
        if sharing {
            object = cache.get_or_insert(checksum, object);
        } else {
            cache.insert(checksum, object.clone());
        }
        Ok(Some(SharedRef { kind, checksum: checksum.to_string(), object }))
    }

    /// Log a recovered anomaly and count it.
    pub fn report(&self, warning: &Warning) {
        tracing::warn!("{}", warning);
        let c = &self.inner.counters;
        let counter = match warning {
            Warning::UnsupportedType { .. } => &c.unsupported_fields,
            Warning::MissingTargetField { .. } => &c.missing_fields,
            Warning::UnknownTypeSkipped { .. } => &c.skipped_unknown,
            Warning::ResolutionMiss { .. } => &c.resolution_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> LoadStats {
        let c = &self.inner.counters;
        LoadStats {
            assets_decoded: c.assets_decoded.load(Ordering::Relaxed),
            shared_hits: c.shared_hits.load(Ordering::Relaxed),
            shared_materialized: c.shared_materialized.load(Ordering::Relaxed),
            resolution_misses: c.resolution_misses.load(Ordering::Relaxed),
            unsupported_fields: c.unsupported_fields.load(Ordering::Relaxed),
            missing_fields: c.missing_fields.load(Ordering::Relaxed),
            skipped_unknown: c.skipped_unknown.load(Ordering::Relaxed),
        }
    }

    /// End the session: drop shared objects and idle pooled buffers.
    ///
    /// Readers still alive keep their buffers; the session stays usable.
    pub fn close(&self) {
        self.inner.caches.clear();
        self.inner.pool.clear();
        tracing::debug!(stats = ?self.stats(), "load session closed");
    }
}

impl std::fmt::Debug for LoadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSession")
            .field("active_readers", &self.inner.pool.active())
            .field("cached_objects", &self.inner.caches.len())
            .finish()
    }
}

/// Builder for [`LoadSession`].
#[derive(Default)]
pub struct LoadSessionBuilder {
    config: SessionConfig,
    settings: Option<Arc<dyn SettingsProvider>>,
    resolver: Option<Arc<dyn AssetResolver>>,
    materializer: Option<Arc<dyn NativeMaterializer>>,
    types: Option<TypeRegistry>,
    overrides: Option<OverrideRegistry>,
}

impl LoadSessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(mut self, settings: impl SettingsProvider + 'static) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Global resolver consulted after the preferred package.
    pub fn resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn materializer(mut self, materializer: impl NativeMaterializer + 'static) -> Self {
        self.materializer = Some(Arc::new(materializer));
        self
    }

    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = Some(types);
        self
    }

    pub fn overrides(mut self, overrides: OverrideRegistry) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn build(self) -> LoadSession {
        let pool = BufferPool::with_idle_timeout(self.config.idle_timeout);
        let caches = Arc::new(SharedCaches::with_capacity(self.config.cache_capacity));

        let weak: Weak<SharedCaches> = Arc::downgrade(&caches);
        pool.on_sweep(Box::new(move || {
            if let Some(caches) = weak.upgrade() {
                caches.clear();
            }
        }));

        LoadSession {
            inner: Arc::new(SessionInner {
                pool,
                caches,
                settings: self.settings.unwrap_or_else(|| Arc::new(LoaderSettings::default())),
                resolver: self.resolver.unwrap_or_else(|| Arc::new(NullResolver)),
                materializer: self.materializer.unwrap_or_else(|| Arc::new(RetainDecoded)),
                types: self.types.unwrap_or_else(TypeRegistry::builtin),
                overrides: self.overrides.unwrap_or_else(OverrideRegistry::builtin),
                counters: Counters::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{AssetType, DecodedObject, PackageRegistry, SharedObject};
    use parking_lot::Mutex;
    use crate::stream::PackageWriter;

    fn texture_bytes(name: &str) -> Vec<u8> {
        let mut w = PackageWriter::new();
        w.write_header("UnityEngine.Texture2D")
            .write_string(name)
            .write_bool(false)
            .write_i32(4)
            .write_byte_array(&[1, 2, 3]);
        w.into_bytes()
    }

    fn package() -> Package {
        Package::builder("Pkg")
            .asset("tex", "t1", AssetType::Texture, texture_bytes("tex"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_find_asset_prefers_package() {
        let local = package();
        let global = Arc::new(PackageRegistry::new());
        let other = package();
        global.add(other.clone());
        let session = LoadSession::builder().resolver(global).build();

        let hit = session.find_asset("t1", Some(&local)).unwrap();
        assert!(hit.package().ptr_eq(&local));
        let hit = session.find_asset("t1", None).unwrap();
        assert!(hit.package().ptr_eq(&other));
        assert!(session.find_asset("nope", Some(&local)).is_none());
    }

    #[test]
    fn test_shared_texture_materialized() {
        let p = package();
        let session = LoadSession::builder().settings(LoaderSettings::sharing_all()).build();
        let a = session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap().unwrap();
        let b = session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap().unwrap();
        assert!(a.same_object(&b));

        let decoded = a.object.as_any().downcast_ref::<DecodedObject>().unwrap();
        match decoded.value() {
            Value::Texture(t) => assert_eq!(t.data, vec![1, 2, 3]),
            other => panic!("unexpected {:?}", other),
        }
        let stats = session.stats();
        assert_eq!(stats.shared_hits, 1);
        assert_eq!(stats.shared_materialized, 1);
    }

    /// Materializer that caches a competing object first, as a parallel
    /// reader of the same checksum would.
    struct Racing {
        session: Arc<Mutex<Option<LoadSession>>>,
        winner: SharedObject,
    }

    impl NativeMaterializer for Racing {
        fn materialize(&self, kind: SharedKind, asset: &Asset, decoded: Value) -> Result<SharedObject> {
            if let Some(session) = self.session.lock().as_ref() {
                session.caches().get(kind).insert(asset.checksum(), self.winner.clone());
            }
            Ok(Arc::new(DecodedObject::new(decoded)))
        }
    }

    fn racing_session(settings: LoaderSettings, winner: &SharedObject) -> (LoadSession, Arc<Mutex<Option<LoadSession>>>) {
        let slot = Arc::new(Mutex::new(None));
        let session = LoadSession::builder()
            .settings(settings)
            .materializer(Racing { session: slot.clone(), winner: winner.clone() })
            .build();
        *slot.lock() = Some(session.clone());
        (session, slot)
    }

    #[test]
    fn test_shared_returns_first_cached_object() {
        let p = package();
        let winner: SharedObject = Arc::new(DecodedObject::new(Value::Null));

        let (session, slot) = racing_session(LoaderSettings::sharing_all(), &winner);
        let got = session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&got.object, &winner));
        let again = session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap().unwrap();
        assert!(got.same_object(&again));
        *slot.lock() = None;

        // Without sharing every read keeps its own object
        let (session, slot) = racing_session(LoaderSettings::default(), &winner);
        let got = session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&got.object, &winner));
        *slot.lock() = None;
    }

    #[test]
    fn test_resolution_miss_counts_warning() {
        let session = LoadSession::new();
        assert!(session.shared(SharedKind::Mesh, "missing", None).unwrap().is_none());
        assert!(session.shared(SharedKind::Mesh, "", None).unwrap().is_none());
        assert_eq!(session.stats().resolution_misses, 1);
    }

    #[test]
    fn test_close_clears_caches_and_pool() {
        let p = package();
        let session = LoadSession::builder().settings(LoaderSettings::sharing_all()).build();
        session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap();
        assert_eq!(session.caches().len(), 1);
        assert!(session.pool().idle_count() > 0);
        session.close();
        assert!(session.caches().is_empty());
        assert_eq!(session.pool().idle_count(), 0);
    }

    #[test]
    fn test_idle_sweep_clears_caches() {
        let p = package();
        let session = LoadSession::builder().settings(LoaderSettings::sharing_all()).build();
        session.shared(SharedKind::Texture, "t1", Some(&p)).unwrap();
        assert!(session.pool().sweep_if_idle(std::time::Duration::ZERO));
        assert!(session.caches().is_empty());
    }

    #[test]
    fn test_deserialize_all_keeps_order() {
        let p = Package::builder("Pkg")
            .asset("a", "1", AssetType::Texture, texture_bytes("a"))
            .asset("b", "2", AssetType::Texture, texture_bytes("b"))
            .build()
            .unwrap();
        let session = LoadSession::new();
        let assets: Vec<Asset> = p.assets().collect();
        let results = session.deserialize_all(&assets);
        let names: Vec<String> = results
            .into_iter()
            .map(|r| match r.unwrap().unwrap() {
                Value::Texture(t) => t.name,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(session.stats().assets_decoded, 2);
    }
}
