//! Cache Entry Module
//!
//! Defines the record stored for every key, with lazy TTL evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// == Cache Entry ==
/// A single cache record: key, opaque value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-chosen key
    pub key: String,
    /// The stored value
    #[serde(default)]
    pub value: Value,
    /// Lifetime in seconds, 0 = never expires
    #[serde(default)]
    pub lifetime: u64,
    /// Write timestamp, set by the store
    pub created_at: DateTime<Utc>,
    /// Attributes stored next to the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written at `created_at`.
    ///
    /// Negative lifetimes are clamped to 0 and an empty options map is
    /// normalised to `None`.
    pub fn new(
        key: impl Into<String>,
        value: Value,
        lifetime: i64,
        options: Option<Map<String, Value>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            lifetime: clamp_lifetime(lifetime),
            created_at,
            options: options.filter(|o| !o.is_empty()),
        }
    }

    /// Blank entry for a key that has nothing stored yet.
    pub fn blank(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(key, Value::Null, 0, None, now)
    }

    // == Is Expired ==
    /// Checks whether the entry is logically expired at `now`.
    ///
    /// Expired iff `lifetime > 0` and `now` is strictly after
    /// `created_at + lifetime`. At the exact boundary the entry is still live.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Instant after which the entry is expired, `None` for never.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.lifetime == 0 {
            return None;
        }
        let secs = i64::try_from(self.lifetime).unwrap_or(i64::MAX);
        Duration::try_seconds(secs).and_then(|d| self.created_at.checked_add_signed(d))
    }

    /// Remaining lifetime in whole seconds, `None` if the entry never expires.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at()
            .map(|expires| (expires - now).num_seconds().max(0) as u64)
    }

    // == Value Accessors ==
    /// Returns the value, or `default` when it is null or a blank string.
    pub fn value_or(&self, default: Value) -> Value {
        match &self.value {
            Value::Null => default,
            Value::String(s) if s.trim().is_empty() => default,
            other => other.clone(),
        }
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.value = value.into();
        self
    }

    pub fn set_lifetime(&mut self, lifetime: i64) -> &mut Self {
        self.lifetime = clamp_lifetime(lifetime);
        self
    }

    // == Options ==
    /// Returns a single options attribute.
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.as_ref().and_then(|o| o.get(name))
    }

    /// Sets a single options attribute. Setting `Value::Null` removes it.
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        let options = self.options.get_or_insert_with(Map::new);
        if value.is_null() {
            options.remove(&name);
        } else {
            options.insert(name, value);
        }
        if options.is_empty() {
            self.options = None;
        }
        self
    }
}

/// Negative lifetimes mean "never expires".
pub fn clamp_lifetime(lifetime: i64) -> u64 {
    lifetime.max(0) as u64
}
