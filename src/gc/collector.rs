//! Garbage Collector
//!
//! One pass enumerates the active backend and removes swap leftovers,
//! runtime status counters, expired records and entries whose owning entity
//! no longer exists. Anything it cannot attribute with certainty is kept.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::owners::EntityRepository;
use super::rules::{KeyClass, OwnerRules};
use crate::backend::{CacheBackend, Engine, Sweep};
use crate::cache::CacheStore;
use crate::error::{CacheError, Result};

/// Outcome of a collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub engine: Engine,
    /// Engine cannot be enumerated; nothing was done
    pub skipped: bool,
    pub scanned: usize,
    pub swap_purged: usize,
    pub status_purged: usize,
    pub orphans: usize,
    pub retained: usize,
    pub expired: usize,
}

impl GcReport {
    fn new(engine: Engine) -> Self {
        Self {
            engine,
            skipped: false,
            scanned: 0,
            swap_purged: 0,
            status_purged: 0,
            orphans: 0,
            retained: 0,
            expired: 0,
        }
    }

    /// Number of entries removed by the pass.
    pub fn removed(&self) -> usize {
        self.swap_purged + self.status_purged + self.orphans + self.expired
    }
}

// == Garbage Collector ==
pub struct GarbageCollector {
    store: Arc<CacheStore>,
    rules: OwnerRules,
    running: Mutex<()>,
}

impl GarbageCollector {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_rules(store, OwnerRules::default())
    }

    pub fn with_rules(store: Arc<CacheStore>, rules: OwnerRules) -> Self {
        Self {
            store,
            rules,
            running: Mutex::new(()),
        }
    }

    pub fn rules(&self) -> &OwnerRules {
        &self.rules
    }

    /// Runs one pass against the active backend.
    ///
    /// Fails with [`CacheError::GcInProgress`] while another pass is running.
    pub fn collect(&self, owners: &dyn EntityRepository) -> Result<GcReport> {
        let _pass = self.running.try_lock().ok_or(CacheError::GcInProgress)?;

        let selector = self.store.selector();
        let backend = selector.resolve(None)?;
        let mut report = GcReport::new(backend.engine());
        let now = selector.clock().now();

        match backend.sweep(now)? {
            Sweep::Unsupported => {
                debug!("{} cache expires its own entries, skipping GC", report.engine);
                report.skipped = true;
            }
            Sweep::Expired(count) => report.expired = count,
            Sweep::Keys { keys, swap_purged } => {
                report.swap_purged = swap_purged;
                self.reconcile(backend.as_ref(), now, keys, owners, &mut report);
            }
        }

        info!(
            "GC pass on {}: scanned={} removed={} retained={}",
            report.engine,
            report.scanned,
            report.removed(),
            report.retained
        );
        Ok(report)
    }

    fn reconcile(
        &self,
        backend: &dyn CacheBackend,
        now: DateTime<Utc>,
        keys: Vec<String>,
        owners: &dyn EntityRepository,
        report: &mut GcReport,
    ) {
        for key in keys {
            report.scanned += 1;

            match backend.fetch(&key) {
                Ok(Some(entry)) if !entry.is_expired(now) => {}
                Ok(_) => {
                    self.store.delete(&key);
                    report.expired += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Cannot read '{}', keeping it: {}", key, e);
                    report.retained += 1;
                    continue;
                }
            }

            match self.rules.classify(&key) {
                KeyClass::Status => {
                    self.store.delete(&key);
                    report.status_purged += 1;
                }
                KeyClass::Owned { rule, id } => match owners.lookup(rule.owner, &id) {
                    Ok(true) => report.retained += 1,
                    Ok(false) => {
                        debug!("Removing '{}': {:?} {} is gone", key, rule.owner, id);
                        self.store.delete(&key);
                        report.orphans += 1;
                    }
                    Err(e) => {
                        warn!("Owner lookup for '{}' failed, keeping it: {}", key, e);
                        report.retained += 1;
                    }
                },
                KeyClass::Ambiguous { .. } | KeyClass::Unmatched => report.retained += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendSelector;
    use crate::cache::{CacheEntry, Clock, ManualClock};
    use crate::gc::{EntityKind, OwnerId, StaticRegistry};
    use crate::settings::Settings;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::Path;

    fn collector_for(dir: &Path, engine: &str) -> (GarbageCollector, Arc<CacheStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let selector = Arc::new(BackendSelector::new(
            Arc::new(Settings::in_memory()),
            dir.join("cache"),
            Some(dir.join("cache.sqlite")),
            clock.clone(),
        ));
        selector.resolve(Some(engine)).unwrap();
        let store = Arc::new(CacheStore::new(selector));
        (GarbageCollector::new(store.clone()), store, clock)
    }

    struct Unreachable;

    impl EntityRepository for Unreachable {
        fn lookup(&self, _kind: EntityKind, _id: &OwnerId) -> Result<bool> {
            Err(CacheError::Connection("owner database down".into()))
        }
    }

    struct FailingReads;

    impl CacheBackend for FailingReads {
        fn engine(&self) -> Engine {
            Engine::Filesystem
        }

        fn fetch(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(CacheError::Backend("read timed out".into()))
        }

        fn save(&self, _entry: &CacheEntry) -> Result<bool> {
            Ok(true)
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_orphans_removed_live_owners_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, _) = collector_for(tmp.path(), "filesystem");
        for key in ["cmd42", "cmd99", "cmdCacheAttr42", "widgetHtmlmobile7", "dependancyzwave"] {
            store.set(key, 1, 0, None);
        }
        let owners = StaticRegistry::new()
            .with(EntityKind::Command, "42")
            .with(EntityKind::Plugin, "zwave");

        let report = gc.collect(&owners).unwrap();

        assert!(store.exists("cmd42"));
        assert!(store.exists("cmdCacheAttr42"));
        assert!(store.exists("dependancyzwave"));
        assert!(!store.exists("cmd99"));
        assert!(!store.exists("widgetHtmlmobile7"));
        assert_eq!(report.scanned, 5);
        assert_eq!(report.orphans, 2);
        assert_eq!(report.retained, 3);
    }

    #[test]
    fn test_status_counters_purged() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, _) = collector_for(tmp.path(), "filesystem");
        store.set("device1::state", "ok", 0, None);
        store.set("device1::lastCommunication", "2024-01-01", 0, None);

        let report = gc.collect(&StaticRegistry::new()).unwrap();

        assert_eq!(report.status_purged, 2);
        assert!(!store.exists("device1::state"));
    }

    #[test]
    fn test_unattributable_keys_retained() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, _) = collector_for(tmp.path(), "filesystem");
        for key in ["cmdfoo", "market::list", "widgetHtmltablet3"] {
            store.set(key, 1, 0, None);
        }

        let report = gc.collect(&StaticRegistry::new()).unwrap();

        assert_eq!(report.retained, 3);
        assert_eq!(report.removed(), 0);
        assert!(store.exists("cmdfoo"));
    }

    #[test]
    fn test_lookup_failure_retains() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, _) = collector_for(tmp.path(), "filesystem");
        store.set("cmd5", 1, 0, None);

        let report = gc.collect(&Unreachable).unwrap();

        assert_eq!(report.retained, 1);
        assert!(store.exists("cmd5"));
    }

    #[test]
    fn test_camera_snapshots_follow_their_device() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, _) = collector_for(tmp.path(), "filesystem");
        store.set("camera7", "jpeg", 0, None);
        store.set("camera12", "jpeg", 0, None);
        let owners = StaticRegistry::new().with(EntityKind::Device, "12");

        let report = gc.collect(&owners).unwrap();

        assert!(!store.exists("camera7"));
        assert!(store.exists("camera12"));
        assert_eq!(report.orphans, 1);
        assert_eq!(report.retained, 1);
    }

    #[test]
    fn test_unreadable_record_retained() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, clock) = collector_for(tmp.path(), "filesystem");
        store.set("cmd99", 1, 0, None);
        let mut report = GcReport::new(Engine::Filesystem);

        gc.reconcile(
            &FailingReads,
            clock.now(),
            vec!["cmd99".to_string()],
            &StaticRegistry::new(),
            &mut report,
        );

        assert_eq!(report.retained, 1);
        assert_eq!(report.removed(), 0);
        assert!(store.exists("cmd99"));
    }

    #[test]
    fn test_swap_files_and_expired_records() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, clock) = collector_for(tmp.path(), "filesystem");
        store.set("market::list", 1, 10, None);
        let shard = tmp.path().join("cache").join("ab");
        std::fs::create_dir_all(&shard).unwrap();
        std::fs::write(shard.join(".tmp123.swap"), b"partial").unwrap();
        clock.advance(Duration::seconds(11));

        let report = gc.collect(&StaticRegistry::new()).unwrap();

        assert_eq!(report.swap_purged, 1);
        assert_eq!(report.expired, 1);
        assert!(!shard.join(".tmp123.swap").exists());
        let remaining = walkdir::WalkDir::new(store.selector().cache_dir())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_relational_expires_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, store, clock) = collector_for(tmp.path(), "relational");
        store.set("short", 1, 5, None);
        store.set("forever", 1, 0, None);
        store.set("cmd99", 1, 0, None);
        clock.advance(Duration::seconds(6));

        let report = gc.collect(&StaticRegistry::new()).unwrap();

        assert_eq!(report.engine, Engine::Relational);
        assert_eq!(report.expired, 1);
        // Ownership is not reconciled on the relational engine
        assert!(store.exists("cmd99"));
        assert!(store.exists("forever"));
    }

    #[test]
    fn test_overlapping_pass_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (gc, _, _) = collector_for(tmp.path(), "filesystem");

        let _held = gc.running.lock();
        assert!(matches!(
            gc.collect(&StaticRegistry::new()),
            Err(CacheError::GcInProgress)
        ));
    }
}
