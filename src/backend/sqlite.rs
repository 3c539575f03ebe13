//! SQLite-based relational cache backend.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use super::{CacheBackend, Engine, Sweep};
use crate::cache::{CacheEntry, Clock};
use crate::error::{CacheError, Result};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Relational cache backend.
///
/// One `cache` table keyed by `key`; writes are replace-on-conflict. Expiry
/// is checked on every fetch and rows can be swept eagerly.
pub struct SqliteBackend {
    /// Database connection (wrapped for thread safety).
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn, clock)
    }

    /// Backend over a private in-memory database.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                "key" TEXT NOT NULL PRIMARY KEY,
                value TEXT,
                options TEXT,
                lifetime INTEGER NOT NULL DEFAULT 0,
                datetime TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_datetime
                ON cache(datetime);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Number of rows currently stored, expired or not.
    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_datetime(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CacheError::Backend(format!("bad datetime '{}': {}", text, e)))
}

fn decode_value(text: Option<String>) -> Value {
    match text {
        // Values written by other tools may be plain strings
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => Value::Null,
    }
}

impl CacheBackend for SqliteBackend {
    fn engine(&self) -> Engine {
        Engine::Relational
    }

    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(Option<String>, Option<String>, i64, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                r#"SELECT value, options, lifetime, datetime FROM cache WHERE "key" = ?1"#,
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
        };

        let Some((value, options, lifetime, datetime)) = row else {
            return Ok(None);
        };

        let options = match options {
            Some(text) => Some(serde_json::from_str::<Map<String, Value>>(&text)?),
            None => None,
        };
        let entry = CacheEntry::new(
            key,
            decode_value(value),
            lifetime,
            options,
            parse_datetime(&datetime)?,
        );

        if entry.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &CacheEntry) -> Result<bool> {
        let value = serde_json::to_string(&entry.value)?;
        let options = match &entry.options {
            Some(options) if !options.is_empty() => Some(serde_json::to_string(options)?),
            _ => None,
        };
        let lifetime = i64::try_from(entry.lifetime).unwrap_or(i64::MAX);
        let datetime = entry.created_at.format(DATETIME_FORMAT).to_string();

        let conn = self.conn.lock();
        let changed = conn.execute(
            r#"INSERT OR REPLACE INTO cache ("key", value, options, lifetime, datetime)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![entry.key, value, options, lifetime, datetime],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(r#"DELETE FROM cache WHERE "key" = ?1"#, params![key])?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM cache", [])?;
        debug!("Flushed {} rows from relational cache", removed);
        Ok(())
    }

    /// Deletes rows whose lifetime elapsed before `now`. Rows with a zero
    /// lifetime never expire and are kept.
    fn sweep(&self, now: DateTime<Utc>) -> Result<Sweep> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            r#"
            DELETE FROM cache
            WHERE lifetime > 0
              AND CAST(strftime('%s', datetime) AS INTEGER) + lifetime < ?1
            "#,
            params![now.timestamp()],
        )?;
        Ok(Sweep::Expired(removed))
    }
}
