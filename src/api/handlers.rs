//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Backend calls block,
//! so every handler that reaches a backend runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::backend::BackendSelector;
use crate::cache::{CacheStore, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::gc::{GarbageCollector, GcReport, StaticRegistry};
use crate::models::{
    validate_key, ArchiveResponse, DeleteResponse, EngineRequest, EngineResponse,
    ExistsResponse, FlushResponse, FreshnessResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse, StatsResponse,
};
use crate::persist::PersistenceBridge;
use crate::settings::Settings;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CacheStore>,
    pub bridge: Arc<PersistenceBridge>,
    pub gc: Arc<GarbageCollector>,
    /// Owner registry read by each GC pass; GC is refused without one
    pub owners_path: Option<PathBuf>,
}

impl AppState {
    /// Creates a new AppState over `store`, archiving to `bridge`.
    pub fn new(store: Arc<CacheStore>, bridge: PersistenceBridge) -> Self {
        Self {
            gc: Arc::new(GarbageCollector::new(store.clone())),
            bridge: Arc::new(bridge),
            store,
            owners_path: None,
        }
    }

    pub fn with_owners(mut self, path: impl Into<PathBuf>) -> Self {
        self.owners_path = Some(path.into());
        self
    }

    /// Creates a new AppState from configuration.
    ///
    /// Loads the persisted settings; the backend itself is resolved lazily on
    /// first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = Arc::new(Settings::load(&config.settings_path)?);
        let selector = Arc::new(BackendSelector::new(
            settings,
            config.cache_dir(),
            Some(config.database_path.clone()),
            Arc::new(SystemClock),
        ));
        let store = Arc::new(CacheStore::new(selector.clone()));

        let mut bridge = PersistenceBridge::new(selector, config.archive_path.clone());
        if let Some((uid, gid)) = config.cache_owner {
            bridge = bridge.with_owner(uid, gid);
        }

        let state = Self::new(store, bridge);
        Ok(match &config.owners_path {
            Some(path) => state.with_owners(path.clone()),
            None => state,
        })
    }

    fn selector(&self) -> &Arc<BackendSelector> {
        self.store.selector()
    }

    fn engine_response(&self) -> EngineResponse {
        EngineResponse {
            configured: self.selector().configured_engine(),
            active: self.selector().active_engine(),
            fallbacks: self.selector().fallbacks(),
        }
    }
}

/// Runs a blocking backend call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let store = state.store.clone();
    let key = req.key.clone();
    let stored = blocking(move || {
        store.set(&req.key, req.value, req.lifetime.unwrap_or(0), req.options)
    })
    .await?;

    if !stored {
        return Err(CacheError::Backend(format!("write of '{}' was not accepted", key)));
    }
    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;
    let store = state.store.clone();
    let lookup = key.clone();
    match blocking(move || store.get(&lookup)).await? {
        Some(entry) => Ok(Json(entry.into())),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExistsResponse>> {
    check_key(&key)?;
    let store = state.store.clone();
    let lookup = key.clone();
    let exists = blocking(move || store.exists(&lookup)).await?;
    Ok(Json(ExistsResponse { key, exists }))
}

/// Handler for DELETE /del/:key
///
/// Succeeds whether or not the key was present.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;
    let store = state.store.clone();
    let target = key.clone();
    blocking(move || store.delete(&target)).await?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /flush
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<FlushResponse>> {
    let store = state.store.clone();
    blocking(move || store.flush()).await?;
    Ok(Json(FlushResponse {
        message: "Cache flushed".to_string(),
        engine: state.selector().active_engine(),
    }))
}

/// Handler for GET /engine
pub async fn get_engine_handler(State(state): State<AppState>) -> Json<EngineResponse> {
    Json(state.engine_response())
}

/// Handler for PUT /engine
///
/// Persists the requested engine and rebuilds the backend. A network engine
/// that cannot be reached is replaced by the filesystem for this process.
pub async fn set_engine_handler(
    State(state): State<AppState>,
    Json(req): Json<EngineRequest>,
) -> Result<Json<EngineResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let selector = state.selector().clone();
    let engine = req.engine.trim().to_string();
    let resolved = blocking(move || selector.resolve(Some(&engine))).await??;
    info!("Cache engine switched to {}", resolved.engine());

    Ok(Json(state.engine_response()))
}

/// Handler for POST /gc
pub async fn gc_handler(State(state): State<AppState>) -> Result<Json<GcReport>> {
    let Some(path) = state.owners_path.clone() else {
        return Err(CacheError::Config("no owner registry configured".to_string()));
    };
    let gc = state.gc.clone();
    let report = blocking(move || {
        let owners = StaticRegistry::load(&path)?;
        gc.collect(&owners)
    })
    .await??;
    Ok(Json(report))
}

/// Handler for GET /persist
pub async fn freshness_handler(State(state): State<AppState>) -> Result<Json<FreshnessResponse>> {
    let bridge = state.bridge.clone();
    let fresh = blocking(move || bridge.is_fresh()).await?;
    Ok(Json(FreshnessResponse {
        archive: state.bridge.archive_path().display().to_string(),
        fresh,
    }))
}

/// Handler for POST /persist
pub async fn persist_handler(State(state): State<AppState>) -> Result<Json<ArchiveResponse>> {
    let bridge = state.bridge.clone();
    let written = blocking(move || bridge.persist()).await??;
    Ok(Json(ArchiveResponse::new(state.bridge.archive_path(), written)))
}

/// Handler for POST /restore
pub async fn restore_handler(State(state): State<AppState>) -> Result<Json<ArchiveResponse>> {
    let bridge = state.bridge.clone();
    let restored = blocking(move || bridge.restore()).await??;
    Ok(Json(ArchiveResponse::new(state.bridge.archive_path(), restored)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.store.stats(),
        state.selector().active_engine(),
        state.selector().fallbacks(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_state() -> (AppState, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path());
        (AppState::from_config(&config).unwrap(), tmp)
    }

    fn set_request(key: &str, value: serde_json::Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            lifetime: None,
            options: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let (state, _tmp) = test_state();

        let req = set_request("cmd7", json!({"state": "on"}));
        assert!(set_handler(State(state.clone()), Json(req)).await.is_ok());

        let response = get_handler(State(state), Path("cmd7".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"state": "on"}));
        assert_eq!(response.lifetime, 0);
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let (state, _tmp) = test_state();

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_and_exists_handlers() {
        let (state, _tmp) = test_state();
        set_handler(State(state.clone()), Json(set_request("gone", json!(1))))
            .await
            .unwrap();

        delete_handler(State(state.clone()), Path("gone".to_string()))
            .await
            .unwrap();
        let response = exists_handler(State(state.clone()), Path("gone".to_string()))
            .await
            .unwrap();
        assert!(!response.exists);

        // Deleting again still succeeds
        assert!(delete_handler(State(state), Path("gone".to_string())).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let (state, _tmp) = test_state();

        let result = set_handler(State(state), Json(set_request("", json!("value")))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_engine_switch_persists_setting() {
        let (state, tmp) = test_state();

        let response = set_engine_handler(
            State(state.clone()),
            Json(EngineRequest {
                engine: "MariadbCache".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.configured, "MariadbCache");
        assert_eq!(response.active, Some(crate::backend::Engine::Relational));

        let settings = Settings::load(tmp.path().join("settings.json")).unwrap();
        assert_eq!(settings.get(crate::settings::ENGINE).as_deref(), Some("MariadbCache"));
    }

    #[tokio::test]
    async fn test_gc_requires_registry() {
        let (state, _tmp) = test_state();

        let result = gc_handler(State(state)).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _tmp) = test_state();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
