//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - GC: reconciles cache keys against their owners
//! - Persist: refreshes the cache archive

mod maintenance;

pub use maintenance::{spawn_gc_task, spawn_persist_task};
