//! Redis cache backend.

use std::time::Duration;

use parking_lot::Mutex;
use redis::Commands;
use tracing::{debug, info};

use super::{CacheBackend, Engine};
use crate::cache::CacheEntry;
use crate::error::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis backend storing each entry as a JSON string.
///
/// Expiry is delegated to redis itself via `SET ... EX`.
pub struct RedisBackend {
    conn: Mutex<redis::Connection>,
    endpoint: String,
}

impl RedisBackend {
    /// Connects and pings the server. An address starting with `/` is a unix
    /// socket path and `port` is ignored.
    pub fn connect(addr: &str, port: u16) -> Result<Self> {
        let endpoint = if addr.starts_with('/') {
            format!("redis+unix://{}", addr)
        } else {
            format!("redis://{}:{}/", addr, port)
        };

        let client = redis::Client::open(endpoint.as_str())?;
        let mut conn = client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
        let _: String = redis::cmd("PING").query(&mut conn)?;

        info!("Redis cache backend connected to {}", endpoint);

        Ok(Self {
            conn: Mutex::new(conn),
            endpoint,
        })
    }
}

impl CacheBackend for RedisBackend {
    fn engine(&self) -> Engine {
        Engine::Redis
    }

    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let raw: Option<String> = self.conn.lock().get(key)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, entry: &CacheEntry) -> Result<bool> {
        let payload = serde_json::to_string(entry)?;
        let mut conn = self.conn.lock();
        if entry.lifetime > 0 {
            conn.set_ex::<_, _, ()>(&entry.key, payload, entry.lifetime)?;
        } else {
            conn.set::<_, _, ()>(&entry.key, payload)?;
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn.lock().del::<_, ()>(key)?;
        Ok(())
    }

    /// Remote caches are flushed with their own administrative tools.
    fn flush(&self) -> Result<()> {
        debug!("Flush ignored for redis backend at {}", self.endpoint);
        Ok(())
    }
}
