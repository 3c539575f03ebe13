//! Persistence Bridge
//!
//! Archives the filesystem cache directory into a single gzip tarball so it
//! survives reboots of a volatile data directory, and unpacks it again on
//! start. Engines whose data does not live in the cache directory are left
//! alone.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::{BackendSelector, SWAP_MARKER};
use crate::error::{CacheError, Result};

/// An archive younger than this is considered fresh.
pub const FRESHNESS_WINDOW_MINUTES: i64 = 65;

/// Mode applied to the archive and the cache tree after persisting
pub const PERSIST_MODE: u32 = 0o774;
/// Mode applied to the cache tree after restoring
pub const RESTORE_MODE: u32 = 0o777;

pub struct PersistenceBridge {
    selector: Arc<BackendSelector>,
    archive: PathBuf,
    owner: Option<(u32, u32)>,
}

impl PersistenceBridge {
    pub fn new(selector: Arc<BackendSelector>, archive: impl Into<PathBuf>) -> Self {
        Self {
            selector,
            archive: archive.into(),
            owner: None,
        }
    }

    /// Chowns the archive and the cache tree to `uid:gid` after each persist
    /// or restore.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = Some((uid, gid));
        self
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Cache directory when the active engine keeps its data there.
    fn file_engine_dir(&self) -> Result<Option<&Path>> {
        let backend = self.selector.resolve(None)?;
        if backend.engine().is_file_based() {
            Ok(Some(self.selector.cache_dir()))
        } else {
            debug!("{} cache has nothing to archive", backend.engine());
            Ok(None)
        }
    }

    // == Persist ==
    /// Writes the archive. Returns `false` when the engine is not file based.
    pub fn persist(&self) -> Result<bool> {
        let Some(dir) = self.file_engine_dir()? else {
            return Ok(false);
        };
        fs::create_dir_all(dir)?;
        let parent = match self.archive.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let staging = tempfile::NamedTempFile::new_in(parent)?;
        let mut builder = tar::Builder::new(GzEncoder::new(staging, Compression::default()));
        let mut archived = 0usize;
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if vanished(&e) => continue,
                Err(e) => return Err(CacheError::Persistence(e.to_string())),
            };
            if entry.file_name().to_string_lossy().contains(SWAP_MARKER) {
                continue;
            }
            let path = entry.path();
            let name = path
                .strip_prefix(dir)
                .map_err(|e| CacheError::Persistence(e.to_string()))?;
            let appended = if entry.file_type().is_dir() {
                builder.append_dir(name, path)
            } else {
                // Records are replaced by rename, so an open handle stays consistent
                File::open(path).and_then(|mut file| builder.append_file(name, &mut file))
            };
            match appended {
                Ok(()) => archived += 1,
                // Deleted or renamed over by a concurrent write
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} vanished while archiving", path.display())
                }
                Err(e) => {
                    return Err(CacheError::Persistence(format!(
                        "archiving {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        let staging = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| CacheError::Persistence(format!("finishing archive: {}", e)))?;
        staging.persist(&self.archive).map_err(|e| e.error)?;

        set_mode(&self.archive, PERSIST_MODE)?;
        if let Some((uid, gid)) = self.owner {
            chown(&self.archive, uid, gid)?;
        }
        set_tree_mode(dir, PERSIST_MODE, self.owner)?;

        debug!("Archived {} cache entries", archived);
        info!("Cache persisted to {}", self.archive.display());
        Ok(true)
    }

    // == Freshness ==
    /// Always true for engines that do not need archiving.
    pub fn is_fresh(&self) -> bool {
        match self.file_engine_dir() {
            Ok(Some(_)) => {}
            Ok(None) => return true,
            Err(e) => {
                warn!("Cannot resolve cache engine for freshness check: {}", e);
                return true;
            }
        }

        let modified = match fs::metadata(&self.archive).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return false,
        };
        self.selector.clock().now() - modified <= Duration::minutes(FRESHNESS_WINDOW_MINUTES)
    }

    // == Restore ==
    /// Replaces the cache directory with the archive contents. Without an
    /// archive an empty directory is created. Returns whether anything was
    /// unpacked.
    pub fn restore(&self) -> Result<bool> {
        let Some(dir) = self.file_engine_dir()? else {
            return Ok(false);
        };

        if !self.archive.exists() {
            fs::create_dir_all(dir)?;
            set_mode(dir, RESTORE_MODE)?;
            debug!("No cache archive at {}, starting empty", self.archive.display());
            return Ok(false);
        }

        match fs::remove_dir_all(dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::create_dir_all(dir)?;

        let file = File::open(&self.archive)?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        archive.unpack(dir).map_err(|e| {
            CacheError::Persistence(format!("unpacking {}: {}", self.archive.display(), e))
        })?;
        set_tree_mode(dir, RESTORE_MODE, self.owner)?;

        info!("Cache restored from {}", self.archive.display());
        Ok(true)
    }
}

// == Permissions ==
/// Applies `mode` (and `owner`, when set) to every path under `root`,
/// skipping paths removed while walking.
fn set_tree_mode(root: &Path, mode: u32, owner: Option<(u32, u32)>) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if vanished(&e) => continue,
            Err(e) => return Err(CacheError::Persistence(e.to_string())),
        };
        let path = entry.path();
        let applied = set_mode(path, mode).and_then(|()| match owner {
            Some((uid, gid)) => chown(path, uid, gid),
            None => Ok(()),
        });
        match applied {
            Err(CacheError::Io(e)) if e.kind() == ErrorKind::NotFound => continue,
            other => other?,
        }
    }
    Ok(())
}

fn vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .map_or(false, |e| e.kind() == ErrorKind::NotFound)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn chown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
    Ok(())
}

#[cfg(not(unix))]
fn chown(path: &Path, _uid: u32, _gid: u32) -> Result<()> {
    debug!("Skipping chown of {} on this platform", path.display());
    Ok(())
}
