//! Backend Selector
//!
//! Turns the `cache.engine` setting into one live backend handle and owns the
//! fallback-to-filesystem policy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::{CacheBackend, Engine, FilesystemBackend, SqliteBackend};
use crate::cache::Clock;
use crate::error::{CacheError, Result};
use crate::settings::{self, Settings};

// == Capabilities ==
/// Which network clients may be used at runtime.
///
/// Defaults to what was compiled in; tests mask clients to exercise the
/// fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub redis: bool,
    pub memcached: bool,
}

impl Capabilities {
    pub fn compiled() -> Self {
        Self {
            redis: cfg!(feature = "redis"),
            memcached: cfg!(feature = "memcached"),
        }
    }

    pub fn none() -> Self {
        Self {
            redis: false,
            memcached: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::compiled()
    }
}

// == Backend Selector ==
/// Resolves and caches the active backend.
///
/// The handle is built on first resolution and reused until an explicit
/// override replaces it.
pub struct BackendSelector {
    settings: Arc<Settings>,
    cache_dir: PathBuf,
    /// Relational database file, `None` for a private in-memory database
    database_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    capabilities: Capabilities,
    current: RwLock<Option<Arc<dyn CacheBackend>>>,
    fallbacks: AtomicU64,
}

impl BackendSelector {
    pub fn new(
        settings: Arc<Settings>,
        cache_dir: impl Into<PathBuf>,
        database_path: Option<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            cache_dir: cache_dir.into(),
            database_path,
            clock,
            capabilities: Capabilities::compiled(),
            current: RwLock::new(None),
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    // == Resolve ==
    /// Returns the active backend.
    ///
    /// Without an override a cached handle is returned as is. An override is
    /// persisted as `cache.engine` and forces a fresh build. Network engines
    /// that cannot be used fall back to the filesystem; the only error is a
    /// relational database that cannot be opened.
    pub fn resolve(&self, override_engine: Option<&str>) -> Result<Arc<dyn CacheBackend>> {
        if override_engine.is_none() {
            if let Some(handle) = self.current.read().as_ref() {
                return Ok(handle.clone());
            }
        }

        let mut current = self.current.write();
        let name = match override_engine {
            Some(name) => {
                if let Err(e) = self.settings.save(settings::ENGINE, name) {
                    warn!("Could not persist cache engine '{}': {}", name, e);
                }
                *current = None;
                name.to_string()
            }
            None => {
                // Another caller may have built it while we waited
                if let Some(handle) = current.as_ref() {
                    return Ok(handle.clone());
                }
                self.configured_engine()
            }
        };

        let handle = self.build(&name)?;
        info!("Cache engine resolved to {}", handle.engine());
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Engine currently held, without resolving.
    pub fn active_engine(&self) -> Option<Engine> {
        self.current.read().as_ref().map(|h| h.engine())
    }

    /// The raw `cache.engine` setting.
    pub fn configured_engine(&self) -> String {
        self.settings
            .get(settings::ENGINE)
            .unwrap_or_else(|| Engine::Filesystem.to_string())
    }

    /// Number of times a configured engine was replaced by the filesystem.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // == Construction ==
    fn build(&self, name: &str) -> Result<Arc<dyn CacheBackend>> {
        match Engine::parse(name) {
            Some(Engine::Filesystem) => Ok(self.filesystem()),
            Some(Engine::Relational) => self.relational(),
            Some(engine @ Engine::Redis) => {
                let built = if self.capabilities.redis {
                    self.connect_redis()
                } else {
                    Err(CacheError::Capability("redis client disabled".to_string()))
                };
                built.or_else(|e| Ok(self.fall_back(engine, e)))
            }
            Some(engine @ Engine::Memcached) => {
                let built = if self.capabilities.memcached {
                    self.connect_memcached()
                } else {
                    Err(CacheError::Capability("memcached client disabled".to_string()))
                };
                built.or_else(|e| Ok(self.fall_back(engine, e)))
            }
            None => {
                debug!("Unknown cache engine '{}', using filesystem", name);
                Ok(self.filesystem())
            }
        }
    }

    fn fall_back(&self, from: Engine, err: CacheError) -> Arc<dyn CacheBackend> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        error!("{} cache unavailable, fall back to filesystem: {}", from, err);
        self.filesystem()
    }

    fn filesystem(&self) -> Arc<dyn CacheBackend> {
        Arc::new(FilesystemBackend::new(&self.cache_dir, self.clock.clone()))
    }

    fn relational(&self) -> Result<Arc<dyn CacheBackend>> {
        let backend = match &self.database_path {
            Some(path) => SqliteBackend::open(path, self.clock.clone())?,
            None => SqliteBackend::in_memory(self.clock.clone())?,
        };
        Ok(Arc::new(backend))
    }

    #[cfg(feature = "redis")]
    fn connect_redis(&self) -> Result<Arc<dyn CacheBackend>> {
        let addr = self
            .settings
            .get(settings::REDIS_ADDR)
            .unwrap_or_default();
        let port = self.settings.get_parsed(settings::REDIS_PORT, 6379u16);
        Ok(Arc::new(super::RedisBackend::connect(&addr, port)?))
    }

    #[cfg(not(feature = "redis"))]
    fn connect_redis(&self) -> Result<Arc<dyn CacheBackend>> {
        Err(CacheError::Capability(
            "built without the redis feature".to_string(),
        ))
    }

    #[cfg(feature = "memcached")]
    fn connect_memcached(&self) -> Result<Arc<dyn CacheBackend>> {
        let addr = self
            .settings
            .get(settings::MEMCACHE_ADDR)
            .unwrap_or_default();
        let port = self.settings.get_parsed(settings::MEMCACHE_PORT, 11211u16);
        Ok(Arc::new(super::MemcachedBackend::connect(&addr, port)?))
    }

    #[cfg(not(feature = "memcached"))]
    fn connect_memcached(&self) -> Result<Arc<dyn CacheBackend>> {
        Err(CacheError::Capability(
            "built without the memcached feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SystemClock;

    fn selector(dir: &Path, settings: Arc<Settings>) -> BackendSelector {
        BackendSelector::new(
            settings,
            dir.join("cache"),
            Some(dir.join("cache.sqlite")),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_default_engine_is_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let sel = selector(tmp.path(), Arc::new(Settings::in_memory()));

        let handle = sel.resolve(None).unwrap();
        assert_eq!(handle.engine(), Engine::Filesystem);
        assert_eq!(sel.active_engine(), Some(Engine::Filesystem));
    }

    #[test]
    fn test_resolve_reuses_cached_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let sel = selector(tmp.path(), Arc::new(Settings::in_memory()));

        let first = sel.resolve(None).unwrap();
        let second = sel.resolve(None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_override_persists_and_rebuilds() {
        let tmp = tempfile::tempdir().unwrap();
        let settings_path = tmp.path().join("settings.json");
        let sel = selector(
            tmp.path(),
            Arc::new(Settings::load(&settings_path).unwrap()),
        );

        let fs_handle = sel.resolve(None).unwrap();
        let rel_handle = sel.resolve(Some("relational")).unwrap();
        assert!(!Arc::ptr_eq(&fs_handle, &rel_handle));
        assert_eq!(rel_handle.engine(), Engine::Relational);

        // No override: same handle, no rebuild
        let again = sel.resolve(None).unwrap();
        assert!(Arc::ptr_eq(&rel_handle, &again));

        // A later start over the same settings file picks it up
        let restarted = selector(
            tmp.path(),
            Arc::new(Settings::load(&settings_path).unwrap()),
        );
        assert_eq!(restarted.resolve(None).unwrap().engine(), Engine::Relational);
    }

    #[test]
    fn test_missing_capability_falls_back_once() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Arc::new(Settings::in_memory());
        let sel = selector(tmp.path(), settings.clone()).with_capabilities(Capabilities::none());

        let handle = sel.resolve(Some("redis")).unwrap();
        assert_eq!(handle.engine(), Engine::Filesystem);
        assert_eq!(sel.fallbacks(), 1);

        // Cached fallback is reused without another warning
        sel.resolve(None).unwrap();
        assert_eq!(sel.fallbacks(), 1);

        // The override itself stays configured
        assert_eq!(settings.get(settings::ENGINE).as_deref(), Some("redis"));
    }

    #[test]
    fn test_memcached_without_capability_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let sel = selector(tmp.path(), Arc::new(Settings::in_memory()))
            .with_capabilities(Capabilities::none());

        assert_eq!(
            sel.resolve(Some("MemcachedCache")).unwrap().engine(),
            Engine::Filesystem
        );
        assert_eq!(sel.fallbacks(), 1);
    }

    #[test]
    fn test_unknown_engine_uses_filesystem_without_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let sel = selector(tmp.path(), Arc::new(Settings::in_memory()));

        assert_eq!(
            sel.resolve(Some("couchbase")).unwrap().engine(),
            Engine::Filesystem
        );
        assert_eq!(sel.fallbacks(), 0);
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_unreachable_redis_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Arc::new(Settings::in_memory());
        settings.save(settings::REDIS_ADDR, "127.0.0.1").unwrap();
        settings.save(settings::REDIS_PORT, "1").unwrap();
        let sel = selector(tmp.path(), settings);

        assert_eq!(
            sel.resolve(Some("redis")).unwrap().engine(),
            Engine::Filesystem
        );
        assert_eq!(sel.fallbacks(), 1);
    }

    #[test]
    fn test_relational_open_failure_is_surfaced() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the database file should be
        let db_path = tmp.path().join("not-a-file");
        std::fs::create_dir_all(&db_path).unwrap();
        let sel = BackendSelector::new(
            Arc::new(Settings::in_memory()),
            tmp.path().join("cache"),
            Some(db_path),
            Arc::new(SystemClock),
        );

        assert!(sel.resolve(Some("relational")).is_err());
        assert_eq!(sel.fallbacks(), 0);
        assert_eq!(sel.active_engine(), None);
    }
}
