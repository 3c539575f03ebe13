//! appcache - a pluggable application cache
//!
//! One get/set/delete surface over interchangeable storage engines
//! (filesystem, relational, redis, memcached) with lazy expiry, fallback to
//! the filesystem, ownership-aware garbage collection and archiving of the
//! cache directory across restarts.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod gc;
pub mod models;
pub mod persist;
pub mod settings;
pub mod tasks;

pub use api::AppState;
pub use backend::{BackendSelector, CacheBackend, Engine};
pub use cache::CacheStore;
pub use config::Config;
pub use error::{CacheError, Result};
pub use gc::GarbageCollector;
pub use persist::PersistenceBridge;
pub use tasks::{spawn_gc_task, spawn_persist_task};
