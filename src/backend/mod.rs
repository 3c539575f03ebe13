//! Backend Module
//!
//! The storage capability behind the cache store and its implementations.
//!
//! # Engines
//! - `filesystem`: one JSON record per key under a dedicated directory
//! - `relational`: a `cache` table in an embedded SQLite database
//! - `redis`: remote redis (feature `redis`)
//! - `memcached`: remote memcached (feature `memcached`)

mod filesystem;
#[cfg(feature = "memcached")]
mod memcached;
#[cfg(feature = "redis")]
mod redis_cache;
mod selector;
mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheEntry;
use crate::error::Result;

pub use filesystem::FilesystemBackend;
pub(crate) use filesystem::SWAP_MARKER;
#[cfg(feature = "memcached")]
pub use memcached::MemcachedBackend;
#[cfg(feature = "redis")]
pub use redis_cache::RedisBackend;
pub use selector::{BackendSelector, Capabilities};
pub use sqlite::SqliteBackend;

// == Engine ==
/// Identifier of a storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Filesystem,
    Memcached,
    Redis,
    Relational,
}

impl Engine {
    /// Parses an engine identifier. Legacy class-style names are accepted.
    ///
    /// Returns `None` for unknown identifiers; callers treat that as
    /// `Filesystem`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "filesystemcache" | "phpfilecache" => Some(Engine::Filesystem),
            "memcached" | "memcachedcache" => Some(Engine::Memcached),
            "redis" | "rediscache" => Some(Engine::Redis),
            "relational" | "mariadbcache" => Some(Engine::Relational),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Filesystem => "filesystem",
            Engine::Memcached => "memcached",
            Engine::Redis => "redis",
            Engine::Relational => "relational",
        }
    }

    /// Engines whose data lives in the cache directory.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Engine::Filesystem)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Sweep ==
/// Result of enumerating a backend for garbage collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sweep {
    /// Keys found on disk; swap files were removed along the way.
    Keys { keys: Vec<String>, swap_purged: usize },
    /// Rows deleted server-side because their lifetime elapsed.
    Expired(usize),
    /// The engine expires its own entries and cannot be enumerated.
    Unsupported,
}

// == Cache Backend Trait ==
/// Storage capability shared by every engine.
///
/// All operations are synchronous; callers on an async runtime should move
/// them to the blocking pool.
pub trait CacheBackend: Send + Sync {
    fn engine(&self) -> Engine;

    /// Fetches the raw record for `key`.
    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Writes `entry`, replacing any previous record. Returns whether the
    /// engine accepted the write.
    fn save(&self, entry: &CacheEntry) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Engine-specific bulk wipe.
    fn flush(&self) -> Result<()>;

    /// Enumerates stored keys, or expires rows eagerly, for a GC pass.
    fn sweep(&self, _now: DateTime<Utc>) -> Result<Sweep> {
        Ok(Sweep::Unsupported)
    }
}
