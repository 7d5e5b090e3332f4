//! Per-session blob endpoints.
//!
//! - `GET /mvc` returns the caller's blob, creating the session on first
//!   contact.
//! - `PUT /mvc` replaces it.
//! - `GET /mvc/watch` streams every later change as Server-Sent Events.

use std::convert::Infallible;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use stash_kv::{Entry, KvError};
use stash_session::{ResponseHead, SessionId};
use tracing::{debug, warn};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Header carrying the resolved session id.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Create the MVC routes.
pub fn mvc_routes() -> Router<AppState> {
    Router::new()
        .route("/mvc", get(get_mvc_handler).put(put_mvc_handler))
        .route("/mvc/watch", get(watch_mvc_handler))
}

/// GET /api/v1/mvc
pub async fn get_mvc_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let mut head = ResponseHead::new();
    let (id, blob) = state.sessions.get_session_blob(&headers, &mut head).await?;

    let response = (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))],
        blob,
    )
        .into_response();
    finish(response, head, &id)
}

/// PUT /api/v1/mvc
pub async fn put_mvc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let mut head = ResponseHead::new();
    let id = state.sessions.resolve_session(&headers, &mut head)?;
    state.sessions.save_session_blob(&id, body).await?;

    finish(StatusCode::NO_CONTENT.into_response(), head, &id)
}

/// GET /api/v1/mvc/watch
///
/// Emits `update` events carrying `{revision, blob}`. A terminal watch error
/// is sent as an `error` event and closes the stream. The watch is released
/// when the client disconnects or the server shuts down.
pub async fn watch_mvc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    let mut head = ResponseHead::new();
    let id = state.sessions.resolve_session(&headers, &mut head)?;
    let mut watch = state
        .sessions
        .watch_session_updates(&state.shutdown, &id)
        .await?;

    let session_id = id.clone();
    let events = async_stream::stream! {
        while let Some(item) = watch.next().await {
            match item {
                Ok(entry) => yield Ok::<_, Infallible>(update_event(&entry)),
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "Session watch failed");
                    yield Ok(error_event(&err));
                    break;
                }
            }
        }
        debug!(session_id = %session_id, "Session watch closed");
    };

    let response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    finish(response, head, &id)
}

/// Blob change sent to watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseUpdateEvent {
    /// Revision of the write.
    pub revision: u64,
    /// Base64-encoded blob. Empty after a delete.
    pub blob: String,
}

#[derive(Debug, Serialize)]
struct SseErrorEvent {
    message: String,
}

fn update_event(entry: &Entry) -> Event {
    Event::default()
        .event("update")
        .json_data(SseUpdateEvent {
            revision: entry.revision,
            blob: STANDARD.encode(&entry.value),
        })
        .unwrap_or_else(|_| Event::default())
}

fn error_event(err: &KvError) -> Event {
    Event::default()
        .event("error")
        .json_data(SseErrorEvent {
            message: err.to_string(),
        })
        .unwrap_or_else(|_| Event::default())
}

/// Copy the session head onto the response and tag it with the session id.
fn finish(mut response: Response, head: ResponseHead, id: &SessionId) -> Result<Response> {
    let value = HeaderValue::from_str(id.as_str())
        .map_err(|e| ServerError::Internal(format!("session id is not a header value: {e}")))?;
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    for (name, value) in head.into_headers().iter() {
        headers.append(name.clone(), value.clone());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{
        Method, Request,
        header::{COOKIE, SET_COOKIE},
    };
    use stash_kv::{BucketConfig, KeyValueStore, MemoryBucket};
    use stash_session::{SessionCache, SignedCookieStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> (AppState, Arc<MemoryBucket>) {
        let bucket = Arc::new(MemoryBucket::new(BucketConfig::default()).unwrap());
        let sessions = SessionCache::new(bucket.clone(), Arc::new(SignedCookieStore::new("secret")));
        (AppState::new(sessions, ServerConfig::default()), bucket)
    }

    fn app(state: AppState) -> Router {
        Router::new().nest("/api/v1", mvc_routes()).with_state(state)
    }

    fn cookie_from(response: &Response) -> String {
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn request(method: Method, uri: &str, cookie: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn test_first_get_issues_cookie_and_empty_blob() {
        let (state, bucket) = state();
        let response = app(state)
            .oneshot(request(Method::GET, "/api/v1/mvc", None, Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SET_COOKIE));
        let id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
        // Eagerly initialized
        assert!(bucket.get(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (state, _) = state();
        let app = app(state);

        let first = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/mvc", None, Body::empty()))
            .await
            .unwrap();
        let cookie = cookie_from(&first);

        let put = app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/api/v1/mvc",
                Some(&cookie),
                Body::from("{\"todos\":[\"milk\"]}"),
            ))
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::NO_CONTENT);
        // Existing session: no new cookie
        assert!(!put.headers().contains_key(SET_COOKIE));

        let get = app
            .oneshot(request(Method::GET, "/api/v1/mvc", Some(&cookie), Body::empty()))
            .await
            .unwrap();
        let body = axum::body::to_bytes(get.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"{\"todos\":[\"milk\"]}");
    }

    #[tokio::test]
    async fn test_watch_streams_later_puts() {
        let (state, bucket) = state();
        let app = app(state);

        let first = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/mvc", None, Body::empty()))
            .await
            .unwrap();
        let cookie = cookie_from(&first);
        let id = first
            .headers()
            .get(SESSION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let watch = app
            .oneshot(request(Method::GET, "/api/v1/mvc/watch", Some(&cookie), Body::empty()))
            .await
            .unwrap();
        assert_eq!(watch.status(), StatusCode::OK);

        bucket
            .put(&id, bytes::Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let expected = format!("\"blob\":\"{}\"", STANDARD.encode(b"hello"));
        let mut body = watch.into_body().into_data_stream();
        let mut seen = String::new();
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(chunk) = body.next().await {
                seen.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
                if seen.contains(&expected) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();

        assert!(found, "no update in: {seen}");
        assert!(seen.contains("event: update"));
    }

    #[tokio::test]
    async fn test_store_full_maps_to_413() {
        let bucket = Arc::new(
            MemoryBucket::new(
                BucketConfig::default()
                    .with_compression(false)
                    .with_max_bytes(64),
            )
            .unwrap(),
        );
        let sessions = SessionCache::new(bucket, Arc::new(SignedCookieStore::new("secret")));
        let app = app(AppState::new(sessions, ServerConfig::default()));

        let response = app
            .oneshot(request(
                Method::PUT,
                "/api/v1/mvc",
                None,
                Body::from(vec![0u8; 128]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: crate::ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "capacity_exceeded");
        assert_eq!(error.limit, Some(64));
    }
}
