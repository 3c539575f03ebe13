//! Memcached cache backend.

use chrono::Utc;
use tracing::{debug, info};

use super::{CacheBackend, Engine};
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Memcached treats expirations above 30 days as absolute unix timestamps.
const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

/// Memcached backend storing each entry as a JSON string.
pub struct MemcachedBackend {
    client: memcache::Client,
    endpoint: String,
}

impl MemcachedBackend {
    /// Connects to `addr:port` and checks the server answers `version`.
    pub fn connect(addr: &str, port: u16) -> Result<Self> {
        let endpoint = format!("memcache://{}:{}", addr, port);
        let client = memcache::Client::connect(endpoint.as_str())
            .map_err(|e| CacheError::Connection(format!("{}: {}", endpoint, e)))?;
        client
            .version()
            .map_err(|e| CacheError::Connection(format!("{}: {}", endpoint, e)))?;

        info!("Memcached cache backend connected to {}", endpoint);

        Ok(Self { client, endpoint })
    }
}

/// Converts a lifetime into memcached's expiration argument.
fn expiration(lifetime: u64) -> u32 {
    let seconds = if lifetime > RELATIVE_EXPIRY_LIMIT {
        (Utc::now().timestamp().max(0) as u64).saturating_add(lifetime)
    } else {
        lifetime
    };
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

impl CacheBackend for MemcachedBackend {
    fn engine(&self) -> Engine {
        Engine::Memcached
    }

    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let raw: Option<String> = self.client.get(key)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, entry: &CacheEntry) -> Result<bool> {
        let payload = serde_json::to_string(entry)?;
        self.client
            .set(&entry.key, payload.as_str(), expiration(entry.lifetime))?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.client.delete(key)?;
        Ok(())
    }

    /// Remote caches are flushed with their own administrative tools.
    fn flush(&self) -> Result<()> {
        debug!("Flush ignored for memcached backend at {}", self.endpoint);
        Ok(())
    }
}
