//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check store behaviour over generated keys, values and
//! lifetimes on the filesystem and relational engines.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use crate::backend::BackendSelector;
use crate::cache::{CacheStore, ManualClock};
use crate::settings::Settings;

// == Test Helpers ==
fn store_for(dir: &Path, engine: &str) -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let selector = Arc::new(BackendSelector::new(
        Arc::new(Settings::in_memory()),
        dir.join("cache"),
        Some(dir.join("cache.sqlite")),
        clock.clone(),
    ));
    selector.resolve(Some(engine)).unwrap();
    (CacheStore::new(selector), clock)
}

// == Strategies ==
/// Generates cache keys in the shapes the application uses
fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_]{1,64}",
        "(cmd|cron|widgetHtml)[0-9]{1,6}",
        "[a-z]{1,12}[0-9]{1,4}::[a-zA-Z]{1,20}",
    ]
}

/// Generates JSON values: scalars, strings and small records
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-zA-Z0-9 ]{0,128}".prop_map(|s| json!(s)),
        ("[a-z]{1,8}", any::<i32>()).prop_map(|(k, v)| json!({ "name": k, "nested": [v, v] })),
    ]
}

fn engine_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("filesystem"), Just("relational")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Storing then immediately reading returns the stored value.
    #[test]
    fn prop_roundtrip_storage(
        engine in engine_strategy(),
        key in key_strategy(),
        value in value_strategy(),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store_for(tmp.path(), engine);

        prop_assert!(store.set(&key, value.clone(), 0, None));
        let entry = store.get(&key);
        prop_assert!(entry.is_some(), "key should be readable right after set");
        prop_assert_eq!(entry.unwrap().value, value);
    }

    // A second set replaces the first value.
    #[test]
    fn prop_overwrite_semantics(
        engine in engine_strategy(),
        key in key_strategy(),
        v1 in value_strategy(),
        v2 in value_strategy(),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store_for(tmp.path(), engine);

        store.set(&key, v1, 0, None);
        store.set(&key, v2.clone(), 0, None);
        prop_assert_eq!(store.get(&key).unwrap().value, v2);
    }

    // Live up to created_at + lifetime, gone strictly after.
    #[test]
    fn prop_expiry_window(
        engine in engine_strategy(),
        key in key_strategy(),
        lifetime in 1i64..86_400,
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let (store, clock) = store_for(tmp.path(), engine);

        store.set(&key, "v", lifetime, None);
        clock.advance(Duration::seconds(lifetime));
        prop_assert!(store.exists(&key));
        clock.advance(Duration::seconds(1));
        prop_assert!(!store.exists(&key));
    }

    // Negative lifetimes behave exactly like 0: never expire.
    #[test]
    fn prop_negative_lifetime_clamps(
        key in key_strategy(),
        lifetime in i64::MIN..=0,
        elapsed in 0i64..10_000_000,
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let (store, clock) = store_for(tmp.path(), "filesystem");

        store.set(&key, "v", lifetime, None);
        clock.advance(Duration::seconds(elapsed));

        let entry = store.get(&key);
        prop_assert!(entry.is_some());
        prop_assert_eq!(entry.unwrap().lifetime, 0);
    }

    // After delete the key is gone.
    #[test]
    fn prop_delete_removes_entry(
        engine in engine_strategy(),
        key in key_strategy(),
        value in value_strategy(),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store_for(tmp.path(), engine);

        store.set(&key, value, 0, None);
        prop_assert!(store.exists(&key));
        store.delete(&key);
        prop_assert!(!store.exists(&key));
    }
}
