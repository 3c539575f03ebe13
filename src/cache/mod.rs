//! Cache Module
//!
//! The cache entry model, the store callers use, and its statistics.

mod clock;
mod entry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{clamp_lifetime, CacheEntry};
pub use stats::{CacheStats, StatsRecorder};
pub use store::CacheStore;

// == Public Constants ==
/// Maximum accepted key length in bytes (memcached's limit)
pub const MAX_KEY_LENGTH: usize = 250;
