//! Cache Store Module
//!
//! The get/set/delete/exists/flush surface. Dispatches to whichever backend
//! the selector resolves and applies lazy TTL expiry on every read.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::backend::{BackendSelector, CacheBackend};
use crate::cache::{CacheEntry, CacheStats, Clock, StatsRecorder};

// == Cache Store ==
/// Public cache surface. Backend failures never escape: reads degrade to a
/// miss and writes to a no-op.
pub struct CacheStore {
    selector: Arc<BackendSelector>,
    clock: Arc<dyn Clock>,
    stats: StatsRecorder,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store over `selector`, sharing its clock.
    pub fn new(selector: Arc<BackendSelector>) -> Self {
        let clock = selector.clock();
        Self {
            selector,
            clock,
            stats: StatsRecorder::new(),
        }
    }

    pub fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    fn backend(&self) -> Option<Arc<dyn CacheBackend>> {
        match self.selector.resolve(None) {
            Ok(backend) => Some(backend),
            Err(e) => {
                error!("No cache backend available: {}", e);
                None
            }
        }
    }

    /// Fetches a live entry; expired, missing and unreadable all map to `None`.
    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let backend = self.backend()?;
        match backend.fetch(key) {
            Ok(Some(entry)) if !entry.is_expired(self.clock.now()) => Some(entry),
            Ok(_) => None,
            Err(e) => {
                debug!("Error reading cache key '{}' from {}: {}", key, backend.engine(), e);
                None
            }
        }
    }

    // == Get ==
    /// Returns the entry for `key` if present and not logically expired.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.lookup(key);
        if entry.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        entry
    }

    // == Exists ==
    pub fn exists(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    // == Entry ==
    /// Returns the stored entry, or a blank one for `key` ready to be filled
    /// and passed to [`CacheStore::save`].
    pub fn entry(&self, key: &str) -> CacheEntry {
        self.get(key)
            .unwrap_or_else(|| CacheEntry::blank(key, self.clock.now()))
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// Negative lifetimes are clamped to 0 (never expires). Returns whether
    /// the backend accepted the write.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<Value>,
        lifetime: i64,
        options: Option<Map<String, Value>>,
    ) -> bool {
        let mut entry = CacheEntry::new(key, value.into(), lifetime, options, self.clock.now());
        self.save(&mut entry)
    }

    // == Save ==
    /// Persists a locally modified entry. The write timestamp is refreshed.
    pub fn save(&self, entry: &mut CacheEntry) -> bool {
        entry.created_at = self.clock.now();
        let accepted = match self.backend() {
            Some(backend) => match backend.save(entry) {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error writing cache key '{}' to {}: {}", entry.key, backend.engine(), e);
                    false
                }
            },
            None => false,
        };
        self.stats.record_write(accepted);
        accepted
    }

    // == Delete ==
    /// Best-effort removal of `key`.
    pub fn delete(&self, key: &str) {
        self.stats.record_delete();
        if let Some(backend) = self.backend() {
            if let Err(e) = backend.delete(key) {
                debug!("Error deleting cache key '{}' from {}: {}", key, backend.engine(), e);
            }
        }
    }

    // == Flush ==
    /// Engine-specific bulk wipe; network engines ignore it.
    pub fn flush(&self) {
        if let Some(backend) = self.backend() {
            match backend.flush() {
                Ok(()) => debug!("Flushed {} cache", backend.engine()),
                Err(e) => warn!("Error flushing {} cache: {}", backend.engine(), e),
            }
        }
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
