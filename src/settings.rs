//! Settings Module
//!
//! Persisted key/value configuration consumed by the backend selector.
//! Values live in a JSON file so an engine override survives restarts.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CacheError, Result};

// == Keys ==
pub const ENGINE: &str = "cache.engine";
pub const MEMCACHE_ADDR: &str = "cache.memcache_addr";
pub const MEMCACHE_PORT: &str = "cache.memcache_port";
pub const REDIS_ADDR: &str = "cache.redis_addr";
pub const REDIS_PORT: &str = "cache.redis_port";

const DEFAULTS: [(&str, &str); 5] = [
    (ENGINE, "filesystem"),
    (MEMCACHE_ADDR, "127.0.0.1"),
    (MEMCACHE_PORT, "11211"),
    (REDIS_ADDR, "127.0.0.1"),
    (REDIS_PORT, "6379"),
];

// == Settings ==
/// Configuration store with optional file persistence.
#[derive(Debug)]
pub struct Settings {
    values: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from `path`; a missing file starts empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                CacheError::Config(format!("invalid settings file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} settings from {}", values.len(), path.display());

        Ok(Self {
            values: RwLock::new(values),
            path: Some(path),
        })
    }

    /// Settings that are never written to disk.
    pub fn in_memory() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Returns the stored value or the built-in default for known keys.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.values.read().get(key) {
            return Some(value.clone());
        }
        DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }

    /// Parses a value, falling back to `default` when absent or malformed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Stores a value and writes the file through.
    pub fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        if let Some(path) = &self.path {
            write_atomically(path, &values)?;
        }
        Ok(())
    }
}

fn write_atomically(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(values)?.as_bytes())?;
    tmp.persist(path)
        .map_err(|e| CacheError::Config(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(())
}
