//! Health endpoints.
//!
//! The session server is healthy when its bucket answers a status call; the
//! transport reports the buckets it serves. Both answer 503 once shutdown has
//! begun.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use stash_kv::BucketStatus;
use tracing::warn;

use crate::state::{AppState, KvState};

/// Health report.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, `unavailable` or `shutting_down`.
    pub status: String,
    pub version: String,
    /// Session bucket status, from the session server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketStatus>,
    /// Buckets registered with the substrate, from the transport.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<String>,
    /// Why the check failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bucket: None,
            buckets: Vec::new(),
            error: None,
        }
    }

    fn shutting_down() -> (StatusCode, Json<Self>) {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Self::with_status("shutting_down")),
        )
    }
}

/// GET /health on the session server.
pub async fn session_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.shutdown.is_cancelled() {
        return HealthResponse::shutting_down();
    }

    let store = state.sessions.store();
    match store.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(HealthResponse {
                bucket: Some(status),
                ..HealthResponse::with_status("ok")
            }),
        ),
        Err(err) => {
            warn!(bucket = %store.bucket(), error = %err, "Session bucket unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    error: Some(err.to_string()),
                    ..HealthResponse::with_status("unavailable")
                }),
            )
        }
    }
}

/// GET /health on the transport.
pub async fn transport_health(State(state): State<KvState>) -> (StatusCode, Json<HealthResponse>) {
    if state.shutdown.is_cancelled() {
        return HealthResponse::shutting_down();
    }

    let mut buckets = state.substrate.bucket_names();
    buckets.sort();
    (
        StatusCode::OK,
        Json(HealthResponse {
            buckets,
            ..HealthResponse::with_status("ok")
        }),
    )
}

pub fn session_health_routes() -> Router<AppState> {
    Router::new().route("/health", get(session_health))
}

pub fn transport_health_routes() -> Router<KvState> {
    Router::new().route("/health", get(transport_health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, response::Response};
    use bytes::Bytes;
    use stash_kv::{
        BucketConfig, Entry, KeyValueStore, KvError, MemoryBucket, Substrate, Watch,
    };
    use stash_session::{SessionCache, SignedCookieStore};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Bucket whose backing service is gone.
    struct Unreachable;

    #[async_trait]
    impl KeyValueStore for Unreachable {
        fn bucket(&self) -> &str {
            "todos"
        }

        async fn get(&self, _key: &str) -> stash_kv::Result<Entry> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: Bytes) -> stash_kv::Result<u64> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn create(&self, _key: &str, _value: Bytes) -> stash_kv::Result<u64> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> stash_kv::Result<u64> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn watch(&self, _key: &str) -> stash_kv::Result<Watch> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn status(&self) -> stash_kv::Result<BucketStatus> {
            Err(KvError::Unavailable("connection refused".into()))
        }
    }

    fn session_state(store: Arc<dyn KeyValueStore>) -> AppState {
        let sessions = SessionCache::new(store, Arc::new(SignedCookieStore::new("secret")));
        AppState::new(sessions, ServerConfig::default())
    }

    async fn check<S>(app: Router<S>, state: S) -> (StatusCode, HealthResponse)
    where
        S: Clone + Send + Sync + 'static,
    {
        let response: Response = app
            .with_state(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_session_health_reports_bucket() {
        let bucket = Arc::new(MemoryBucket::new(BucketConfig::default()).unwrap());
        bucket.put("abc123", Bytes::from_static(b"{}")).await.unwrap();

        let (status, health) = check(session_health_routes(), session_state(bucket)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
        let bucket = health.bucket.unwrap();
        assert_eq!(bucket.bucket, "todos");
        assert_eq!(bucket.values, 1);
    }

    #[tokio::test]
    async fn test_session_health_unreachable_bucket_is_503() {
        let (status, health) =
            check(session_health_routes(), session_state(Arc::new(Unreachable))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "unavailable");
        assert!(health.bucket.is_none());
        assert!(health.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_transport_health_lists_buckets() {
        let substrate = Substrate::new();
        substrate
            .create_or_update_bucket(BucketConfig::new("users"))
            .unwrap();
        substrate
            .create_or_update_bucket(BucketConfig::default())
            .unwrap();
        let state = KvState::new(substrate, ServerConfig::default());

        let (status, health) = check(transport_health_routes(), state).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.buckets, vec!["todos".to_string(), "users".to_string()]);
    }

    #[tokio::test]
    async fn test_health_after_shutdown_is_503() {
        let state = KvState::new(Substrate::new(), ServerConfig::default());
        state.shutdown.cancel();

        let (status, health) = check(transport_health_routes(), state).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "shutting_down");
    }
}
