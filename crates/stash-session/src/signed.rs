//! HMAC-signed cookie store.
//!
//! Cookie value layout: `base64url(json(values)) "." base64url(hmac)`, where
//! the MAC covers the cookie name and the encoded payload.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use http::{HeaderMap, HeaderValue, header::SET_COOKIE};
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::cookie::{CookieError, CookieSession, CookieStore, find_cookie};
use crate::response::ResponseHead;

type HmacSha256 = Hmac<Sha256>;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes written with every `Set-Cookie`.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub path: String,
    /// `None` makes a browser-session cookie.
    pub max_age: Option<Duration>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

/// Cookie store that signs the session with a server-side secret.
#[derive(Clone)]
pub struct SignedCookieStore {
    key: Vec<u8>,
    options: CookieOptions,
}

impl SignedCookieStore {
    /// Create a store signing with `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            options: CookieOptions::default(),
        }
    }

    /// Set the cookie attributes.
    pub fn with_options(mut self, options: CookieOptions) -> Self {
        self.options = options;
        self
    }

    /// Generate a random secret suitable for [`SignedCookieStore::new`].
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn mac(&self, name: &str, payload: &str) -> Result<HmacSha256, CookieError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| CookieError::InvalidKey)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Produce the signed cookie value for a session.
    pub fn encode(&self, session: &CookieSession) -> Result<String, CookieError> {
        let json = serde_json::to_vec(&session.values)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(&session.name, &payload)?.finalize().into_bytes();
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify and decode a cookie value. Returns `None` if it was tampered
    /// with or is malformed.
    pub fn decode(&self, name: &str, raw: &str) -> Option<BTreeMap<String, serde_json::Value>> {
        let (payload, signature) = raw.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.mac(name, payload).ok()?.verify_slice(&signature).ok()?;
        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    fn set_cookie_header(&self, name: &str, value: &str) -> String {
        let mut header = format!("{name}={value}; Path={}", self.options.path);
        if let Some(max_age) = self.options.max_age {
            header.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.options.http_only {
            header.push_str("; HttpOnly");
        }
        if self.options.secure {
            header.push_str("; Secure");
        }
        header.push_str("; SameSite=");
        header.push_str(self.options.same_site.as_str());
        header
    }
}

impl CookieStore for SignedCookieStore {
    fn get(&self, request: &HeaderMap, name: &str) -> Result<CookieSession, CookieError> {
        let Some(raw) = find_cookie(request, name) else {
            return Ok(CookieSession::new(name));
        };

        match self.decode(name, raw) {
            Some(values) => Ok(CookieSession {
                name: name.to_string(),
                values,
                is_new: false,
            }),
            None => {
                warn!(cookie = %name, "Discarding session cookie with invalid signature or payload");
                Ok(CookieSession::new(name))
            }
        }
    }

    fn save(&self, session: &CookieSession, response: &mut ResponseHead) -> Result<(), CookieError> {
        if response.is_committed() {
            return Err(CookieError::HeadersCommitted);
        }
        let value = self.encode(session)?;
        let header = HeaderValue::from_str(&self.set_cookie_header(&session.name, &value))?;
        response.append(SET_COOKIE, header);
        debug!(cookie = %session.name, "Session cookie written");
        Ok(())
    }
}

impl std::fmt::Debug for SignedCookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCookieStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::COOKIE;

    fn store() -> SignedCookieStore {
        SignedCookieStore::new("test-secret")
    }

    /// Turn the `Set-Cookie` written to `response` into request headers.
    fn echo(response: &ResponseHead) -> HeaderMap {
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    #[test]
    fn test_missing_cookie_is_new_session() {
        let session = store().get(&HeaderMap::new(), "connections").unwrap();
        assert!(session.is_new);
        assert!(session.values.is_empty());
    }

    #[test]
    fn test_saved_session_reads_back() {
        let store = store();
        let mut session = CookieSession::new("connections");
        session.insert("id", "abc123");

        let mut response = ResponseHead::new();
        store.save(&session, &mut response).unwrap();

        let loaded = store.get(&echo(&response), "connections").unwrap();
        assert!(!loaded.is_new);
        assert_eq!(loaded.get_str("id"), Some("abc123"));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let store = store().with_options(CookieOptions {
            secure: true,
            ..CookieOptions::default()
        });
        let mut response = ResponseHead::new();
        store.save(&CookieSession::new("connections"), &mut response).unwrap();

        let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(header.starts_with("connections="));
        assert!(header.contains("; Path=/"));
        assert!(header.contains("; Max-Age=2592000"));
        assert!(header.contains("; HttpOnly"));
        assert!(header.contains("; Secure"));
        assert!(header.ends_with("; SameSite=Lax"));
    }

    #[test]
    fn test_tampered_cookie_is_new_session() {
        let store = store();
        let mut session = CookieSession::new("connections");
        session.insert("id", "abc123");
        let value = store.encode(&session).unwrap();

        // Swap in a payload claiming a different id
        let (_, signature) = value.split_once('.').unwrap();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"id":"someone-else"}"#);
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("connections={forged}.{signature}")).unwrap(),
        );

        let loaded = store.get(&headers, "connections").unwrap();
        assert!(loaded.is_new);
        assert_eq!(loaded.get_str("id"), None);
    }

    #[test]
    fn test_other_secret_rejects_cookie() {
        let mut session = CookieSession::new("connections");
        session.insert("id", "abc123");
        let mut response = ResponseHead::new();
        store().save(&session, &mut response).unwrap();

        let loaded = SignedCookieStore::new("different")
            .get(&echo(&response), "connections")
            .unwrap();
        assert!(loaded.is_new);
    }

    #[test]
    fn test_garbage_cookie_is_new_session() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("connections=not-a-cookie"));
        assert!(store().get(&headers, "connections").unwrap().is_new);
    }

    #[test]
    fn test_save_after_commit_fails() {
        let mut response = ResponseHead::new();
        response.commit();
        let err = store()
            .save(&CookieSession::new("connections"), &mut response)
            .unwrap_err();
        assert!(matches!(err, CookieError::HeadersCommitted));
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(
            SignedCookieStore::generate_secret(),
            SignedCookieStore::generate_secret()
        );
    }
}
