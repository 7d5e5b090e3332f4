//! Cancellable per-key change streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::entry::Entry;
use crate::error::Result;

type EntryStream = Pin<Box<dyn Stream<Item = Result<Entry>> + Send>>;

/// A live subscription to one key.
///
/// Yields entries in write order until the source ends, a terminal error is
/// delivered, or the subscription is cancelled. Dropping the watch releases
/// the underlying subscription.
pub struct Watch {
    key: String,
    cancel: CancellationToken,
    inner: EntryStream,
}

impl Watch {
    /// Wrap a stream of entries so it ends when `parent` (or the watch's own
    /// token) is cancelled.
    pub fn new<S>(key: impl Into<String>, parent: &CancellationToken, entries: S) -> Self
    where
        S: Stream<Item = Result<Entry>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let inner = async_stream::stream! {
            let mut entries = Box::pin(entries);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    next = entries.next() => next,
                };
                match next {
                    Some(item) => yield item,
                    None => break,
                }
            }
        };

        Self {
            key: key.into(),
            cancel,
            inner: Box::pin(inner),
        }
    }

    /// Tie this watch to a caller's cancellation token.
    ///
    /// The returned watch ends when either `parent` or this watch is cancelled.
    pub fn bind(self, parent: &CancellationToken) -> Self {
        let key = self.key.clone();
        Watch::new(key, parent, self)
    }

    /// Key being watched.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token that ends this watch when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the watch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop watching and release the subscription.
    pub fn stop(self) {
        self.cancel.cancel();
    }
}

impl Stream for Watch {
    type Item = Result<Entry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("key", &self.key)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
