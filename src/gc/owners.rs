//! Owner lookup for garbage collection.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Domain entity types that own cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Command,
    Device,
    Scenario,
    Cron,
    Plugin,
}

/// Identifier extracted from a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerId {
    Numeric(u64),
    Named(String),
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Numeric(id) => write!(f, "{}", id),
            OwnerId::Named(name) => f.write_str(name),
        }
    }
}

/// Looks up whether a domain entity still exists.
///
/// An `Err` means the answer is unknown; the collector keeps the entry.
pub trait EntityRepository: Send + Sync {
    fn lookup(&self, kind: EntityKind, id: &OwnerId) -> Result<bool>;
}

// == Static Registry ==
/// Fixed set of known entity ids per kind.
///
/// The daemon loads it from a JSON file of the form
/// `{"command": [1, 2], "plugin": ["zwave"]}` before each pass.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    known: HashMap<EntityKind, HashSet<String>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let raw: HashMap<EntityKind, Vec<Value>> = serde_json::from_str(&text).map_err(|e| {
            CacheError::Config(format!("invalid owner registry {}: {}", path.display(), e))
        })?;

        let mut registry = Self::new();
        for (kind, ids) in raw {
            for id in ids {
                match id {
                    Value::Number(n) => registry.insert(kind, n.to_string()),
                    Value::String(s) => registry.insert(kind, s),
                    other => {
                        return Err(CacheError::Config(format!(
                            "unsupported {:?} id in {}: {}",
                            kind,
                            path.display(),
                            other
                        )))
                    }
                }
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, kind: EntityKind, id: impl Into<String>) {
        self.known.entry(kind).or_default().insert(id.into());
    }

    pub fn with(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.insert(kind, id);
        self
    }

    pub fn remove(&mut self, kind: EntityKind, id: &str) {
        if let Some(ids) = self.known.get_mut(&kind) {
            ids.remove(id);
        }
    }
}

impl EntityRepository for StaticRegistry {
    fn lookup(&self, kind: EntityKind, id: &OwnerId) -> Result<bool> {
        Ok(self
            .known
            .get(&kind)
            .is_some_and(|ids| ids.contains(&id.to_string())))
    }
}
