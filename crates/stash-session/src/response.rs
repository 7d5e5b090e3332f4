//! The outgoing side of a request, before it is flushed.

use http::{HeaderMap, HeaderName, HeaderValue};

/// Response headers that can still be changed, plus whether they have been
/// sent.
///
/// Cookie stores write `Set-Cookie` here. Once [`ResponseHead::commit`] has
/// been called, further cookie saves fail.
#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    headers: HeaderMap,
    committed: bool,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Append a header value, keeping any earlier values for the same name.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Mark the headers as sent.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}
