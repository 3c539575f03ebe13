//! Filesystem backend.
//!
//! Records are JSON files sharded by the first byte of the key's SHA-256:
//! `<dir>/<2 hex>/<64 hex>.cache`. Writes go through a `*.swap` temp file in
//! the same shard and are renamed into place.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use super::{CacheBackend, Engine, Sweep};
use crate::cache::{CacheEntry, Clock};
use crate::error::Result;

const RECORD_EXTENSION: &str = "cache";
/// Any file whose name contains this is an in-flight write.
pub(crate) const SWAP_MARKER: &str = "swap";

/// File-per-key cache backend.
#[derive(Debug)]
pub struct FilesystemBackend {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FilesystemBackend {
    /// The directory is created lazily by the first write.
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir
            .join(&digest[..2])
            .join(format!("{}.{}", digest, RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<Option<CacheEntry>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl CacheBackend for FilesystemBackend {
    fn engine(&self) -> Engine {
        Engine::Filesystem
    }

    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(entry) = Self::read_record(&self.record_path(key))? else {
            return Ok(None);
        };
        if entry.key != key || entry.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &CacheEntry) -> Result<bool> {
        let path = self.record_path(&entry.key);
        let shard = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(shard)?;

        let mut swap = tempfile::Builder::new()
            .prefix(".")
            .suffix(&format!(".{}", SWAP_MARKER))
            .tempfile_in(shard)?;
        swap.write_all(&serde_json::to_vec(entry)?)?;
        swap.persist(&path).map_err(|e| e.error)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        remove_if_present(&self.record_path(key))
    }

    /// Deletes every record, then removes the whole tree so stray files go too.
    fn flush(&self) -> Result<()> {
        let records: Vec<PathBuf> = self.record_files().map(|e| e.into_path()).collect();
        for path in &records {
            remove_if_present(path)?;
        }
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => {
                debug!("Flushed {} records from {}", records.len(), self.dir.display());
                Ok(())
            }
        }
    }

    fn sweep(&self, _now: DateTime<Utc>) -> Result<Sweep> {
        let mut keys = Vec::new();
        let mut swap_purged = 0;

        for file in self.record_files() {
            let name = file.file_name().to_string_lossy();
            if name.contains(SWAP_MARKER) {
                remove_if_present(file.path())?;
                swap_purged += 1;
                continue;
            }
            match Self::read_record(file.path()) {
                Ok(Some(entry)) if !entry.key.trim().is_empty() => keys.push(entry.key),
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable record {}: {}", file.path().display(), e),
            }
        }

        Ok(Sweep::Keys { keys, swap_purged })
    }
}
