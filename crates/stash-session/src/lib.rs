//! Session-scoped, watchable blob cache.
//!
//! Each browser session is bound to a [`SessionId`] carried in a signed
//! cookie. The id keys one opaque blob in a [`stash_kv::KeyValueStore`];
//! callers read it, overwrite it, and watch it for changes made by other
//! requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stash_kv::{BucketConfig, Substrate};
//! use stash_session::{ResponseHead, SessionCache, SignedCookieStore};
//!
//! let substrate = Substrate::new();
//! let bucket = substrate.create_or_update_bucket(BucketConfig::default())?;
//! let cache = SessionCache::new(bucket, Arc::new(SignedCookieStore::new(secret)));
//!
//! let mut response = ResponseHead::new();
//! let (id, blob) = cache.get_session_blob(&request_headers, &mut response).await?;
//! ```

mod cache;
mod config;
mod cookie;
mod error;
mod id;
mod response;
mod signed;

pub use cache::SessionCache;
pub use config::{DEFAULT_COOKIE_NAME, DEFAULT_ID_FIELD, SessionConfig};
pub use cookie::{CookieError, CookieSession, CookieStore, find_cookie};
pub use error::{Error, Result};
pub use id::SessionId;
pub use response::ResponseHead;
pub use signed::{CookieOptions, SameSite, SignedCookieStore};
