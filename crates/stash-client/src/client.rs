//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use stash_kv::{BucketConfig, BucketStatus, Entry, Operation};
use url::Url;

use crate::bucket::RemoteBucket;
use crate::error::{Error, ErrorResponse, Result};
use crate::types::{
    CREATED_HEADER, HealthResponse, OPERATION_HEADER, REVISION_HEADER, RevisionResponse, WireEntry,
};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a Stash key-value transport.
///
/// # Example
///
/// ```no_run
/// use stash_client::KvClient;
///
/// # async fn example() -> stash_client::Result<()> {
/// let client = KvClient::builder()
///     .base_url("http://127.0.0.1:4222")
///     .build()?;
///
/// let revision = client.put("todos", "abc123", "hello".into()).await?;
/// let entry = client.get("todos", "abc123").await?;
/// assert_eq!(entry.revision, revision);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KvClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl KvClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client for a transport on the local host.
    pub fn localhost(port: u16) -> Result<Self> {
        Self::builder()
            .base_url(format!("http://127.0.0.1:{}", port))
            .build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// A bucket handle implementing [`KeyValueStore`](stash_kv::KeyValueStore).
    pub fn bucket(&self, name: impl Into<String>) -> RemoteBucket {
        RemoteBucket::new(self.clone(), name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Check the transport's health.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.inner.base_url.join("health")?;
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Check whether the transport answers health checks.
    pub async fn is_healthy(&self) -> bool {
        self.health().await.is_ok()
    }

    /// Create a bucket, or update the description of an existing one.
    pub async fn create_or_update_bucket(&self, config: &BucketConfig) -> Result<BucketStatus> {
        let url = self.kv_url(&[&config.name])?;
        let response = self
            .inner
            .http
            .put(url)
            .json(config)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Point-in-time status of a bucket.
    pub async fn status(&self, bucket: &str) -> Result<BucketStatus> {
        let url = self.kv_url(&[bucket])?;
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Get the most recent value for a key.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Entry> {
        let url = self.kv_url(&[bucket, key])?;
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        let revision = header(response.headers(), REVISION_HEADER)?
            .parse::<u64>()
            .map_err(|e| Error::Protocol(format!("bad {} header: {}", REVISION_HEADER, e)))?;
        let created = DateTime::parse_from_rfc3339(header(response.headers(), CREATED_HEADER)?)
            .map_err(|e| Error::Protocol(format!("bad {} header: {}", CREATED_HEADER, e)))?
            .with_timezone(&Utc);
        let operation = parse_operation(header(response.headers(), OPERATION_HEADER)?)?;
        let value = response.bytes().await?;

        Ok(Entry {
            bucket: bucket.to_string(),
            key: key.to_string(),
            value,
            revision,
            created,
            operation,
        })
    }

    /// Overwrite the value for a key. Returns the write's revision.
    pub async fn put(&self, bucket: &str, key: &str, value: Bytes) -> Result<u64> {
        let url = self.kv_url(&[bucket, key])?;
        let response = self
            .inner
            .http
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        let body: RevisionResponse = self.handle_response(response).await?;
        Ok(body.revision)
    }

    /// Write a value only if the key holds no live value.
    ///
    /// A live value comes back as a 409 `key_exists` API error.
    pub async fn create(&self, bucket: &str, key: &str, value: Bytes) -> Result<u64> {
        let url = self.kv_url(&[bucket, key])?;
        let response = self
            .inner
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        let body: RevisionResponse = self.handle_response(response).await?;
        Ok(body.revision)
    }

    /// Remove the value for a key. Returns the delete's revision.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<u64> {
        let url = self.kv_url(&[bucket, key])?;
        let response = self
            .inner
            .http
            .delete(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        let body: RevisionResponse = self.handle_response(response).await?;
        Ok(body.revision)
    }

    /// Watch a key.
    ///
    /// The current value (if any) arrives first, then every later write. The
    /// request has no timeout; the stream ends when the server closes it or
    /// after the first error.
    pub async fn watch(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<impl Stream<Item = Result<Entry>> + Send + 'static> {
        let url = self.kv_url(&[bucket, key, "watch"])?;
        let response = self
            .inner
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        let bucket = bucket.to_string();
        let mut events = Box::pin(response.bytes_stream().eventsource());

        Ok(async_stream::stream! {
            while let Some(event) = events.next().await {
                let decoded = match event {
                    Ok(event) => decode_event(&bucket, &event.event, &event.data),
                    Err(e) => Err(Error::Stream(e.to_string())),
                };
                match decoded {
                    Ok(Some(entry)) => yield Ok(entry),
                    Ok(None) => {}
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a `/kv/...` URL. Each segment is percent-encoded, so keys may
    /// contain `/`.
    fn kv_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("base_url cannot have a path".to_string()))?
            .pop_if_empty()
            .push("kv")
            .extend(segments);
        Ok(url)
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        let body = match response.json::<ErrorResponse>().await {
            Ok(body) => body,
            Err(_) => ErrorResponse {
                code: "unknown".to_string(),
                message: format!("HTTP {}", status),
                limit: None,
                field: None,
            },
        };
        Error::Api { status, body }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Protocol(format!("missing {} header", name)))
}

fn parse_operation(value: &str) -> Result<Operation> {
    match value {
        "put" => Ok(Operation::Put),
        "delete" => Ok(Operation::Delete),
        other => Err(Error::Protocol(format!("unknown operation '{}'", other))),
    }
}

/// Turn one SSE event into an entry. Events that carry nothing (keep-alives,
/// unnamed events) yield `None`.
fn decode_event(bucket: &str, event: &str, data: &str) -> Result<Option<Entry>> {
    if data.is_empty() {
        return Ok(None);
    }

    let operation = match event {
        "error" => {
            let body: ErrorResponse = serde_json::from_str(data)?;
            return Err(Error::WatchFailed(body));
        }
        "put" => Operation::Put,
        "delete" => Operation::Delete,
        other => {
            tracing::debug!(event = other, "Ignoring unknown watch event");
            return Ok(None);
        }
    };

    let wire: WireEntry = serde_json::from_str(data)?;
    Ok(Some(Entry {
        bucket: bucket.to_string(),
        key: wire.key,
        value: Bytes::from(STANDARD.decode(wire.value)?),
        revision: wire.revision,
        created: wire.created,
        operation,
    }))
}

/// Builder for creating a [`KvClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the base URL of the transport.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout. Watches are not subject to it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<KvClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("stash-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(KvClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let err = KvClient::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_base_url_normalized() {
        let client = KvClient::builder()
            .base_url("http://localhost:4222/prefix")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:4222/prefix/");
    }

    #[test]
    fn test_kv_url_encodes_slashes_in_keys() {
        let client = KvClient::localhost(4222).unwrap();
        let url = client.kv_url(&["todos", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4222/kv/todos/a%2Fb");

        let watch = client.kv_url(&["todos", "abc", "watch"]).unwrap();
        assert_eq!(watch.path(), "/kv/todos/abc/watch");
    }

    #[test]
    fn test_kv_url_keeps_prefix() {
        let client = KvClient::builder()
            .base_url("http://localhost:4222/stash")
            .build()
            .unwrap();
        let url = client.kv_url(&["todos"]).unwrap();
        assert_eq!(url.path(), "/stash/kv/todos");
    }

    #[test]
    fn test_decode_put_event() {
        let data = format!(
            r#"{{"key":"abc","revision":7,"created":"2024-01-01T00:00:00Z","value":"{}"}}"#,
            STANDARD.encode(b"hello")
        );
        let entry = decode_event("todos", "put", &data).unwrap().unwrap();
        assert_eq!(entry.bucket, "todos");
        assert_eq!(entry.key, "abc");
        assert_eq!(entry.revision, 7);
        assert_eq!(&entry.value[..], b"hello");
        assert_eq!(entry.operation, Operation::Put);
    }

    #[test]
    fn test_decode_error_event_is_terminal() {
        let data = r#"{"code":"watch_lagged","message":"fell behind"}"#;
        let err = decode_event("todos", "error", data).unwrap_err();
        match err {
            Error::WatchFailed(body) => assert_eq!(body.code, "watch_lagged"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_skips_empty_and_unknown() {
        assert!(decode_event("todos", "put", "").unwrap().is_none());
        assert!(decode_event("todos", "ping", "{}").unwrap().is_none());
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!(parse_operation("delete").unwrap(), Operation::Delete);
        assert!(matches!(parse_operation("nope"), Err(Error::Protocol(_))));
    }
}
