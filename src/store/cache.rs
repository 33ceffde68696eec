//! Short-lived read-through cache for a single document.

use std::time::Duration;

use tokio::time::Instant;

/// Default freshness window for cached documents.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Cached copy of one document plus the time it was stored.
#[derive(Debug)]
pub struct DocumentCache<D> {
    entry: Option<(D, Instant)>,
    ttl: Duration,
}

impl<D: Clone> DocumentCache<D> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// True when a value was stored less than `ttl` ago.
    pub fn is_valid(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|(_, stored_at)| stored_at.elapsed() < self.ttl)
    }

    /// The cached value, if still fresh.
    pub fn get(&self) -> Option<D> {
        if self.is_valid() {
            self.entry.as_ref().map(|(value, _)| value.clone())
        } else {
            None
        }
    }

    pub fn set(&mut self, value: D) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
