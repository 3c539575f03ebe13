//! Maintenance Tasks
//!
//! Periodic garbage collection and archive persistence. Each task runs its
//! passes one at a time on the blocking pool, since backend calls block.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CacheError;
use crate::gc::{GarbageCollector, StaticRegistry};
use crate::persist::PersistenceBridge;

/// Spawns the periodic GC task.
///
/// The owner registry at `owners_path` is reloaded before every pass so
/// entities removed since the last pass are seen. A registry that cannot be
/// read skips the pass.
pub fn spawn_gc_task(
    gc: Arc<GarbageCollector>,
    owners_path: PathBuf,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!("Starting GC task with interval of {} seconds", interval.as_secs());

        loop {
            tokio::time::sleep(interval).await;

            let gc = gc.clone();
            let path = owners_path.clone();
            let pass = tokio::task::spawn_blocking(move || {
                let owners = StaticRegistry::load(&path)?;
                gc.collect(&owners)
            })
            .await;

            match pass {
                Ok(Ok(report)) if report.removed() > 0 => {
                    info!("GC: removed {} entries", report.removed())
                }
                Ok(Ok(_)) => debug!("GC: nothing to remove"),
                Ok(Err(CacheError::GcInProgress)) => debug!("GC: previous pass still running"),
                Ok(Err(e)) => warn!("GC pass skipped: {}", e),
                Err(e) => error!("GC task panicked: {}", e),
            }
        }
    })
}

/// Spawns the periodic archive task.
pub fn spawn_persist_task(bridge: Arc<PersistenceBridge>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!("Starting persist task with interval of {} seconds", interval.as_secs());

        loop {
            tokio::time::sleep(interval).await;

            let bridge = bridge.clone();
            match tokio::task::spawn_blocking(move || bridge.persist()).await {
                Ok(Ok(true)) => debug!("Persist: archive written"),
                Ok(Ok(false)) => debug!("Persist: engine has nothing to archive"),
                Ok(Err(e)) => warn!("Persist failed: {}", e),
                Err(e) => error!("Persist task panicked: {}", e),
            }
        }
    })
}
