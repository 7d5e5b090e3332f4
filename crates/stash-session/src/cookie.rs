//! Cookie-backed session storage.
//!
//! A [`CookieStore`] reads a named session (a string-keyed map) from the
//! request's `Cookie` headers and writes it back as a `Set-Cookie` header on
//! the [`ResponseHead`]. The session cache only ever touches the identifier
//! field; everything else in the map is carried through untouched.

use std::collections::BTreeMap;

use http::HeaderMap;

use crate::response::ResponseHead;

/// Errors raised by cookie stores.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// Headers were already flushed, so no cookie can be set.
    #[error("response headers already committed")]
    HeadersCommitted,

    /// The session could not be serialized.
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),

    /// The encoded cookie is not a legal header value.
    #[error("invalid cookie header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The signing key was rejected.
    #[error("invalid signing key")]
    InvalidKey,
}

/// A named, cookie-backed session.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieSession {
    /// Cookie name.
    pub name: String,

    /// Session fields.
    pub values: BTreeMap<String, serde_json::Value>,

    /// True when no valid cookie was present on the request.
    pub is_new: bool,
}

impl CookieSession {
    /// An empty session that has not been saved yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            is_new: true,
        }
    }

    /// A field's value if it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_str())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(field.into(), value.into());
    }
}

/// Loads and saves cookie-backed sessions.
pub trait CookieStore: Send + Sync {
    /// Read the named session from request headers.
    ///
    /// A missing or unreadable cookie yields a new, empty session.
    fn get(&self, request: &HeaderMap, name: &str) -> Result<CookieSession, CookieError>;

    /// Write the session to the response.
    ///
    /// Fails with [`CookieError::HeadersCommitted`] if the response head has
    /// already been sent.
    fn save(&self, session: &CookieSession, response: &mut ResponseHead) -> Result<(), CookieError>;
}

/// Find the raw value of a cookie across all `Cookie` headers.
pub fn find_cookie<'a>(request: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}
