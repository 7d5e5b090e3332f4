//! Per-key expiry deadlines for a bucket.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Deadline bookkeeping for a bucket's TTL.
///
/// Every write pushes the key's deadline out by one TTL. Deadlines are read
/// from the tokio clock so paused test runtimes can step past them.
#[derive(Debug)]
pub struct ExpiryTracker {
    deadlines: HashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl ExpiryTracker {
    /// `None` disables expiry for the bucket.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            deadlines: HashMap::new(),
            ttl,
        }
    }

    /// Restart a key's lifetime after a write.
    pub fn touch(&mut self, key: &str) {
        if let Some(ttl) = self.ttl {
            self.deadlines.insert(key.to_string(), Instant::now() + ttl);
        }
    }

    /// Whether a key's value has outlived the TTL.
    ///
    /// With a TTL configured, a key that was never written counts as expired.
    pub fn is_expired(&self, key: &str) -> bool {
        if self.ttl.is_none() {
            return false;
        }
        self.deadlines
            .get(key)
            .is_none_or(|deadline| Instant::now() > *deadline)
    }

    pub fn remove(&mut self, key: &str) {
        self.deadlines.remove(key);
    }

    /// Forget every key past its deadline and return them.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.deadlines.retain(|key, deadline| {
            let live = now <= *deadline;
            if !live {
                expired.push(key.clone());
            }
            live
        });
        expired
    }
}
