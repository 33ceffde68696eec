//! Typed access to a single bin: cached reads and serialized read-modify-write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{run_with_retry, DocumentCache, DocumentStore, RateLimiter, RetryPolicy, StoreError};

/// A JSON document with a known shape.
pub trait Document: Clone + Default + Serialize + Send + Sync + 'static {
    /// Short name used in logs.
    const LABEL: &'static str;

    /// Validate a raw record and convert it into the typed document.
    fn decode(record: Value) -> Result<Self, StoreError>;
}

/// A store connection with process-wide pacing and rate-limit retries.
pub struct StoreGateway {
    store: Arc<dyn DocumentStore>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn DocumentStore>, min_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            store,
            limiter: RateLimiter::new(min_interval),
            retry,
        }
    }

    pub async fn fetch(&self, bin_id: &str) -> Result<Value, StoreError> {
        let store = self.store.as_ref();
        let limiter = &self.limiter;
        run_with_retry(self.retry, move || async move {
            limiter.throttle().await;
            store.fetch(bin_id).await
        })
        .await
    }

    pub async fn put(&self, bin_id: &str, record: &Value) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        let limiter = &self.limiter;
        run_with_retry(self.retry, move || async move {
            limiter.throttle().await;
            store.put(bin_id, record).await
        })
        .await
    }

    pub async fn create(&self, record: &Value) -> Result<String, StoreError> {
        let store = self.store.as_ref();
        let limiter = &self.limiter;
        run_with_retry(self.retry, move || async move {
            limiter.throttle().await;
            store.create(record).await
        })
        .await
    }
}

/// One logical document in the store.
///
/// Reads go through a short-lived cache. Writes are queued on a FIFO lock so
/// that at most one read-modify-write cycle runs per bin; each cycle re-fetches
/// the document, bypassing the cache, before applying its change.
pub struct Bin<D> {
    id: String,
    gateway: Arc<StoreGateway>,
    cache: Mutex<DocumentCache<D>>,
    write_queue: tokio::sync::Mutex<()>,
}

impl<D: Document> Bin<D> {
    pub fn new(id: impl Into<String>, gateway: Arc<StoreGateway>, cache_ttl: Duration) -> Self {
        Self {
            id: id.into(),
            gateway,
            cache: Mutex::new(DocumentCache::new(cache_ttl)),
            write_queue: tokio::sync::Mutex::new(()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, DocumentCache<D>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current document, served from cache while fresh.
    pub async fn read(&self) -> Result<D, StoreError> {
        let cached = self.cache().get();
        if let Some(cached) = cached {
            tracing::debug!(bin = D::LABEL, "Using cached document");
            return Ok(cached);
        }
        self.fetch_latest().await
    }

    /// Fetch the document from the store and refresh the cache.
    pub async fn fetch_latest(&self) -> Result<D, StoreError> {
        let record = self.gateway.fetch(&self.id).await.inspect_err(|e| {
            tracing::error!(bin = D::LABEL, bin_id = %self.id, error = %e, "Failed to read bin");
        })?;
        let document = D::decode(record)?;
        self.cache().set(document.clone());
        Ok(document)
    }

    /// Serialized read-modify-write.
    ///
    /// `transform` edits a copy of the freshly fetched document; fields it
    /// leaves alone keep their stored value. If it fails nothing is written.
    /// The queue slot is released on every exit path.
    pub async fn update<T, E, F>(&self, transform: F) -> Result<T, E>
    where
        F: FnOnce(&mut D) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _slot = self.write_queue.lock().await;

        let mut document = self.fetch_latest().await?;
        let output = transform(&mut document)?;

        let record = serde_json::to_value(&document).map_err(StoreError::from)?;
        self.gateway.put(&self.id, &record).await.inspect_err(|e| {
            tracing::error!(bin = D::LABEL, bin_id = %self.id, error = %e, "Failed to update bin");
        })?;
        self.cache().set(document);

        Ok(output)
    }

    pub fn invalidate(&self) {
        self.cache().invalidate();
    }
}
