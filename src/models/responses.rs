//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::Engine;
use crate::cache::{CacheEntry, CacheStats};

/// Response body for GET /get/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
    pub lifetime: u64,
    pub created_at: DateTime<Utc>,
    /// Absent for entries that never expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl From<CacheEntry> for GetResponse {
    fn from(entry: CacheEntry) -> Self {
        Self {
            expires_at: entry.expires_at(),
            key: entry.key,
            value: entry.value,
            lifetime: entry.lifetime,
            created_at: entry.created_at,
            options: entry.options,
        }
    }
}

/// Response body for PUT /set
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /del/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted", key),
            key,
        }
    }
}

/// Response body for GET /exists/:key
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for POST /flush
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub message: String,
    pub engine: Option<Engine>,
}

/// Response body for GET and PUT /engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineResponse {
    /// Raw `cache.engine` setting
    pub configured: String,
    /// Engine actually serving requests, if resolved yet
    pub active: Option<Engine>,
    pub fallbacks: u64,
}

/// Response body for GET /persist
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessResponse {
    pub archive: String,
    pub fresh: bool,
}

/// Response body for POST /persist and POST /restore
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResponse {
    pub archive: String,
    /// Whether the archive was written or unpacked
    pub done: bool,
}

impl ArchiveResponse {
    pub fn new(archive: &Path, done: bool) -> Self {
        Self {
            archive: archive.display().to_string(),
            done,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub failed_writes: u64,
    pub deletes: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub engine: Option<Engine>,
    pub fallbacks: u64,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, engine: Option<Engine>, fallbacks: u64) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            failed_writes: stats.failed_writes,
            deletes: stats.deletes,
            engine,
            fallbacks,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
