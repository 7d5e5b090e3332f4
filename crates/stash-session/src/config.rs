//! Configuration for the session cache.

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "connections";

/// Default cookie field holding the session identifier.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Names the session cache uses inside the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name of the cookie-backed session.
    pub cookie_name: String,

    /// Field within the session that holds the identifier.
    pub id_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the identifier field.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }
}
