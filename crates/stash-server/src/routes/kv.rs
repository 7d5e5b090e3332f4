//! Key-value transport endpoints.
//!
//! Exposes a [`Substrate`](stash_kv::Substrate) over HTTP so other processes
//! can use its buckets. Keys are single path segments; a `/` inside a key
//! must be percent-encoded.

use std::convert::Infallible;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use stash_kv::{BucketConfig, BucketStatus, Entry, KeyValueStore, KvError};
use tracing::{debug, warn};

use crate::error::{Result, ServerError, kv_error_parts};
use crate::state::KvState;

/// Header carrying an entry's revision.
pub const REVISION_HEADER: &str = "x-kv-revision";

/// Header carrying an entry's creation time (RFC 3339).
pub const CREATED_HEADER: &str = "x-kv-created";

/// Header carrying an entry's operation.
pub const OPERATION_HEADER: &str = "x-kv-operation";

/// Create the transport routes.
pub fn kv_routes() -> Router<KvState> {
    Router::new()
        .route(
            "/kv/{bucket}",
            get(bucket_status_handler).put(put_bucket_handler),
        )
        .route(
            "/kv/{bucket}/{key}",
            get(get_key_handler)
                .put(put_key_handler)
                .post(create_key_handler)
                .delete(delete_key_handler),
        )
        .route("/kv/{bucket}/{key}/watch", get(watch_key_handler))
}

/// Response to writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

/// Entry as sent to transport watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    pub key: String,
    pub revision: u64,
    pub created: DateTime<Utc>,
    /// Base64-encoded value.
    pub value: String,
}

impl From<&Entry> for WireEntry {
    fn from(entry: &Entry) -> Self {
        Self {
            key: entry.key.clone(),
            revision: entry.revision,
            created: entry.created,
            value: STANDARD.encode(&entry.value),
        }
    }
}

/// PUT /kv/{bucket}
pub async fn put_bucket_handler(
    State(state): State<KvState>,
    Path(bucket): Path<String>,
    Json(config): Json<BucketConfig>,
) -> Result<Json<BucketStatus>> {
    if config.name != bucket {
        return Err(ServerError::BadRequest(format!(
            "bucket name '{}' does not match path '{}'",
            config.name, bucket
        )));
    }
    let bucket = state.substrate.create_or_update_bucket(config)?;
    Ok(Json(bucket.status().await?))
}

/// GET /kv/{bucket}
pub async fn bucket_status_handler(
    State(state): State<KvState>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketStatus>> {
    let bucket = state.substrate.bucket(&bucket)?;
    Ok(Json(bucket.status().await?))
}

/// GET /kv/{bucket}/{key}
pub async fn get_key_handler(
    State(state): State<KvState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response> {
    let entry = state.substrate.bucket(&bucket)?.get(&key).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        HeaderName::from_static(REVISION_HEADER),
        HeaderValue::from(entry.revision),
    );
    headers.insert(
        HeaderName::from_static(OPERATION_HEADER),
        HeaderValue::from_static(entry.operation.as_str()),
    );
    let created = HeaderValue::from_str(&entry.created.to_rfc3339())
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    headers.insert(HeaderName::from_static(CREATED_HEADER), created);

    Ok((headers, entry.value).into_response())
}

/// PUT /kv/{bucket}/{key}
pub async fn put_key_handler(
    State(state): State<KvState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<RevisionResponse>> {
    let revision = state.substrate.bucket(&bucket)?.put(&key, body).await?;
    Ok(Json(RevisionResponse { revision }))
}

/// POST /kv/{bucket}/{key}
///
/// Writes only if the key holds no live value; 409 `key_exists` otherwise.
pub async fn create_key_handler(
    State(state): State<KvState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<RevisionResponse>)> {
    let revision = state.substrate.bucket(&bucket)?.create(&key, body).await?;
    Ok((StatusCode::CREATED, Json(RevisionResponse { revision })))
}

/// DELETE /kv/{bucket}/{key}
pub async fn delete_key_handler(
    State(state): State<KvState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<RevisionResponse>> {
    let revision = state.substrate.bucket(&bucket)?.delete(&key).await?;
    Ok(Json(RevisionResponse { revision }))
}

/// GET /kv/{bucket}/{key}/watch
///
/// Emits `put` and `delete` events carrying a [`WireEntry`]. A terminal
/// error is sent as an `error` event with the usual error body.
pub async fn watch_key_handler(
    State(state): State<KvState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Sse<impl futures::Stream<Item = std::result::Result<Event, Infallible>>>> {
    let watch = state.substrate.bucket(&bucket)?.watch(&key).await?;
    let mut watch = watch.bind(&state.shutdown);

    let events = async_stream::stream! {
        while let Some(item) = watch.next().await {
            match item {
                Ok(entry) => yield Ok(entry_event(&entry)),
                Err(err) => {
                    warn!(bucket = %bucket, key = %key, error = %err, "Transport watch failed");
                    yield Ok(error_event(&err));
                    break;
                }
            }
        }
        debug!(bucket = %bucket, key = %key, "Transport watch closed");
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn entry_event(entry: &Entry) -> Event {
    Event::default()
        .event(entry.operation.as_str())
        .json_data(WireEntry::from(entry))
        .unwrap_or_else(|_| Event::default())
}

fn error_event(err: &KvError) -> Event {
    let (_, body) = kv_error_parts(err);
    Event::default()
        .event("error")
        .json_data(body)
        .unwrap_or_else(|_| Event::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::error::ErrorResponse;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use stash_kv::Substrate;
    use tower::ServiceExt;

    fn app() -> (Router, Substrate) {
        let substrate = Substrate::new();
        substrate
            .create_or_update_bucket(BucketConfig::default())
            .unwrap();
        let state = KvState::new(substrate.clone(), ServerConfig::default());
        (kv_routes().with_state(state), substrate)
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn error_body(response: Response) -> ErrorResponse {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete_key() {
        let (app, _) = app();

        let put = app
            .clone()
            .oneshot(request(Method::PUT, "/kv/todos/abc123", Body::from("hello")))
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);

        let get = app
            .clone()
            .oneshot(request(Method::GET, "/kv/todos/abc123", Body::empty()))
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        assert_eq!(
            get.headers().get(OPERATION_HEADER).unwrap().to_str().unwrap(),
            "put"
        );
        assert!(get.headers().contains_key(REVISION_HEADER));
        assert!(get.headers().contains_key(CREATED_HEADER));
        let body = axum::body::to_bytes(get.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");

        let delete = app
            .clone()
            .oneshot(request(Method::DELETE, "/kv/todos/abc123", Body::empty()))
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::OK);

        let missing = app
            .oneshot(request(Method::GET, "/kv/todos/abc123", Body::empty()))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(missing).await.code, "not_found");
    }

    #[tokio::test]
    async fn test_create_key_only_when_absent() {
        let (app, substrate) = app();

        let created = app
            .clone()
            .oneshot(request(Method::POST, "/kv/todos/abc123", Body::empty()))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);

        substrate
            .bucket("todos")
            .unwrap()
            .put("abc123", bytes::Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let conflict = app
            .oneshot(request(Method::POST, "/kv/todos/abc123", Body::empty()))
            .await
            .unwrap();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(error_body(conflict).await.code, "key_exists");

        let entry = substrate.bucket("todos").unwrap().get("abc123").await.unwrap();
        assert_eq!(&entry.value[..], b"hello");
    }

    #[tokio::test]
    async fn test_percent_encoded_key() {
        let (app, substrate) = app();
        app.oneshot(request(Method::PUT, "/kv/todos/a%2Fb", Body::from("v")))
            .await
            .unwrap();

        let entry = substrate.bucket("todos").unwrap().get("a/b").await.unwrap();
        assert_eq!(&entry.value[..], b"v");
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let (app, _) = app();
        let response = app
            .oneshot(request(Method::GET, "/kv/nope/k", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(response).await.code, "bucket_not_found");
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let (app, _) = app();
        let response = app
            .oneshot(request(Method::PUT, "/kv/todos/.hidden", Body::from("v")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.code, "invalid_key");
    }

    #[tokio::test]
    async fn test_create_bucket_and_conflict() {
        let (app, _) = app();
        let config = BucketConfig::new("other").with_max_bytes(1024);

        let created = app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/kv/other",
                Body::from(serde_json::to_vec(&config).unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);
        let body = axum::body::to_bytes(created.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: BucketStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.max_bytes, 1024);

        let changed = config.with_max_bytes(2048);
        let conflict = app
            .oneshot(request(
                Method::PUT,
                "/kv/other",
                Body::from(serde_json::to_vec(&changed).unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        let error = error_body(conflict).await;
        assert_eq!(error.code, "config_conflict");
        assert_eq!(error.field.as_deref(), Some("max_bytes"));
    }

    #[tokio::test]
    async fn test_bucket_name_must_match_path() {
        let (app, _) = app();
        let response = app
            .oneshot(request(
                Method::PUT,
                "/kv/other",
                Body::from(serde_json::to_vec(&BucketConfig::new("todos")).unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_is_413() {
        let (app, substrate) = app();
        substrate
            .create_or_update_bucket(
                BucketConfig::new("tiny")
                    .with_compression(false)
                    .with_max_bytes(8),
            )
            .unwrap();

        let response = app
            .oneshot(request(Method::PUT, "/kv/tiny/k", Body::from("0123456789")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let error = error_body(response).await;
        assert_eq!(error.code, "capacity_exceeded");
        assert_eq!(error.limit, Some(8));
    }

    #[tokio::test]
    async fn test_watch_streams_put_events() {
        let (app, substrate) = app();
        let bucket = substrate.bucket("todos").unwrap();
        bucket
            .put("k", bytes::Bytes::from_static(b"first"))
            .await
            .unwrap();

        let response = app
            .oneshot(request(Method::GET, "/kv/todos/k/watch", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        bucket.delete("k").await.unwrap();

        let mut body = response.into_body().into_data_stream();
        let mut seen = String::new();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(chunk) = body.next().await {
                seen.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
                if seen.contains("event: delete") {
                    break;
                }
            }
        })
        .await
        .unwrap();

        assert!(seen.contains("event: put"));
        assert!(seen.contains(&STANDARD.encode(b"first")));
        assert!(seen.contains("event: delete"));
    }
}
