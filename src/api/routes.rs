//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, exists_handler, flush_handler, freshness_handler, gc_handler,
    get_engine_handler, get_handler, health_handler, persist_handler, restore_handler,
    set_engine_handler, set_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/exists/:key", get(exists_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/flush", post(flush_handler))
        .route("/engine", get(get_engine_handler).put(set_engine_handler))
        .route("/gc", post(gc_handler))
        .route("/persist", get(freshness_handler).post(persist_handler))
        .route("/restore", post(restore_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::from_config(&Config::with_data_dir(tmp.path())).unwrap();
        (create_router(state), tmp)
    }

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _tmp) = create_test_app();
        assert_eq!(status_of(app, "GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (app, _tmp) = create_test_app();
        assert_eq!(status_of(app, "GET", "/stats").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let (app, _tmp) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/set")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"key":"test","value":"hello","lifetime":60}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let (app, _tmp) = create_test_app();
        assert_eq!(
            status_of(app, "GET", "/get/nonexistent").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_gc_without_registry_fails() {
        let (app, _tmp) = create_test_app();
        assert_eq!(
            status_of(app, "POST", "/gc").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_maintenance_endpoints() {
        let (app, _tmp) = create_test_app();
        assert_eq!(status_of(app.clone(), "GET", "/persist").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "POST", "/persist").await, StatusCode::OK);
        assert_eq!(status_of(app.clone(), "POST", "/restore").await, StatusCode::OK);
        assert_eq!(status_of(app, "POST", "/flush").await, StatusCode::OK);
    }
}
