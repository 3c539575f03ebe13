//! Configuration Module
//!
//! Daemon configuration loaded from environment variables. Runtime cache
//! settings (engine, remote addresses) live in the persisted
//! [`Settings`](crate::settings::Settings) file instead.

use std::env;
use std::path::PathBuf;

/// Daemon configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Root of the cache data (cache directory, archive, database)
    pub data_dir: PathBuf,
    /// Persisted settings file
    pub settings_path: PathBuf,
    /// SQLite database of the relational engine
    pub database_path: PathBuf,
    /// Archive written by the persistence bridge
    pub archive_path: PathBuf,
    /// Owner registry for garbage collection; GC is disabled without it
    pub owners_path: Option<PathBuf>,
    /// GC task interval in seconds
    pub gc_interval: u64,
    /// Persist task interval in seconds
    pub persist_interval: u64,
    /// Restore the archive before serving
    pub restore_on_start: bool,
    /// `uid:gid` applied to the archive after each persist
    pub cache_owner: Option<(u32, u32)>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `APPCACHE_PORT` - HTTP server port (default: 3000)
    /// - `APPCACHE_DATA_DIR` - Data root (default: `./data`)
    /// - `APPCACHE_SETTINGS` - Settings file (default: `<data>/settings.json`)
    /// - `APPCACHE_DB` - SQLite database (default: `<data>/cache.sqlite`)
    /// - `APPCACHE_ARCHIVE` - Cache archive (default: `<data>/cache.tar.gz`)
    /// - `APPCACHE_OWNERS` - Owner registry JSON (default: unset, GC disabled)
    /// - `GC_INTERVAL` - GC frequency in seconds (default: 600)
    /// - `PERSIST_INTERVAL` - Persist frequency in seconds (default: 1800)
    /// - `RESTORE_ON_START` - Restore the archive at startup (default: true)
    /// - `CACHE_OWNER_UID` / `CACHE_OWNER_GID` - Archive owner, both required
    pub fn from_env() -> Self {
        let defaults = Self::with_data_dir(
            env::var("APPCACHE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        );

        let uid = parsed("CACHE_OWNER_UID");
        let gid = parsed("CACHE_OWNER_GID");

        Self {
            server_port: parsed("APPCACHE_PORT").unwrap_or(defaults.server_port),
            settings_path: path("APPCACHE_SETTINGS").unwrap_or(defaults.settings_path),
            database_path: path("APPCACHE_DB").unwrap_or(defaults.database_path),
            archive_path: path("APPCACHE_ARCHIVE").unwrap_or(defaults.archive_path),
            owners_path: path("APPCACHE_OWNERS"),
            gc_interval: parsed("GC_INTERVAL").unwrap_or(defaults.gc_interval),
            persist_interval: parsed("PERSIST_INTERVAL").unwrap_or(defaults.persist_interval),
            restore_on_start: parsed("RESTORE_ON_START").unwrap_or(defaults.restore_on_start),
            cache_owner: uid.zip(gid),
            data_dir: defaults.data_dir,
        }
    }

    /// Default layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            server_port: 3000,
            settings_path: data_dir.join("settings.json"),
            database_path: data_dir.join("cache.sqlite"),
            archive_path: data_dir.join("cache.tar.gz"),
            owners_path: None,
            gc_interval: 600,
            persist_interval: 1800,
            restore_on_start: true,
            cache_owner: None,
            data_dir,
        }
    }

    /// Directory of the filesystem engine.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir("./data")
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cache_dir(), PathBuf::from("./data/cache"));
        assert_eq!(config.archive_path, PathBuf::from("./data/cache.tar.gz"));
        assert_eq!(config.gc_interval, 600);
        assert!(config.owners_path.is_none());
        assert!(config.restore_on_start);
    }

    #[test]
    fn test_layout_follows_data_dir() {
        let config = Config::with_data_dir("/var/lib/appcache");
        assert_eq!(config.settings_path, PathBuf::from("/var/lib/appcache/settings.json"));
        assert_eq!(config.database_path, PathBuf::from("/var/lib/appcache/cache.sqlite"));
    }

    #[test]
    fn test_config_from_env() {
        // Single test touching the environment to avoid races between tests
        for name in [
            "APPCACHE_PORT",
            "APPCACHE_DATA_DIR",
            "APPCACHE_SETTINGS",
            "APPCACHE_DB",
            "APPCACHE_ARCHIVE",
            "APPCACHE_OWNERS",
            "GC_INTERVAL",
            "PERSIST_INTERVAL",
            "RESTORE_ON_START",
            "CACHE_OWNER_GID",
        ] {
            env::remove_var(name);
        }
        env::set_var("APPCACHE_DATA_DIR", "/tmp/appcache-env");
        env::set_var("GC_INTERVAL", "30");
        env::set_var("RESTORE_ON_START", "false");
        env::set_var("CACHE_OWNER_UID", "33");

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.archive_path, PathBuf::from("/tmp/appcache-env/cache.tar.gz"));
        assert_eq!(config.gc_interval, 30);
        assert!(!config.restore_on_start);
        // uid alone is not enough
        assert!(config.cache_owner.is_none());

        env::set_var("CACHE_OWNER_GID", "33");
        assert_eq!(Config::from_env().cache_owner, Some((33, 33)));

        for name in ["APPCACHE_DATA_DIR", "GC_INTERVAL", "RESTORE_ON_START", "CACHE_OWNER_UID", "CACHE_OWNER_GID"] {
            env::remove_var(name);
        }
    }
}
