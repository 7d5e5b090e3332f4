//! Request logging middleware.
//!
//! Each request gets a `stash_request` span. Transport requests record the
//! bucket and key from the path; session requests record the id the handler
//! tagged the response with.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{field::Empty, info_span};

use crate::config::ServerConfig;
use crate::routes::SESSION_ID_HEADER;

/// Bucket and key named by a `/kv/...` path. Keys stay percent-encoded.
fn kv_target(path: &str) -> Option<(&str, Option<&str>)> {
    let mut segments = path.strip_prefix("/kv/")?.split('/');
    let bucket = segments.next().filter(|s| !s.is_empty())?;
    let key = segments.next().filter(|s| !s.is_empty());
    Some((bucket, key))
}

/// Log each request with its status, duration and the data it touched.
pub async fn request_logging_middleware(
    State(config): State<Arc<ServerConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.request_logging {
        return next.run(request).await;
    }

    let path = request.uri().path();
    let span = info_span!(
        "stash_request",
        method = %request.method(),
        path = %path,
        bucket = Empty,
        key = Empty,
        session_id = Empty,
    );
    if let Some((bucket, key)) = kv_target(path) {
        span.record("bucket", bucket);
        if let Some(key) = key {
            span.record("key", key);
        }
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Some(id) = response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        span.record("session_id", id);
    }

    let status = response.status();
    span.in_scope(|| {
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), elapsed_ms, "Request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), elapsed_ms, "Request rejected");
        } else {
            tracing::info!(status = status.as_u16(), elapsed_ms, "Request served");
        }
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[test]
    fn test_kv_target() {
        assert_eq!(kv_target("/kv/todos"), Some(("todos", None)));
        assert_eq!(kv_target("/kv/todos/abc123"), Some(("todos", Some("abc123"))));
        assert_eq!(
            kv_target("/kv/todos/a%2Fb/watch"),
            Some(("todos", Some("a%2Fb")))
        );
        assert_eq!(kv_target("/kv/"), None);
        assert_eq!(kv_target("/api/v1/mvc"), None);
        assert_eq!(kv_target("/health"), None);
    }

    #[tokio::test]
    async fn test_logging_passes_response_through() {
        let config = Arc::new(ServerConfig::default().with_request_logging(true));
        let app = Router::new()
            .route(
                "/api/v1/mvc",
                get(|| async { ([(SESSION_ID_HEADER, "abc123")], "blob") }),
            )
            .route("/kv/{bucket}/{key}", get(|| async { StatusCode::NOT_FOUND }))
            .layer(axum::middleware::from_fn_with_state(
                config,
                request_logging_middleware,
            ));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/mvc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[SESSION_ID_HEADER].to_str().unwrap(),
            "abc123"
        );

        let response = app
            .oneshot(Request::builder().uri("/kv/todos/abc123").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
