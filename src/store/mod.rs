//! Remote document store plumbing.
//!
//! The store only knows whole JSON documents ("bins"): fetch one, overwrite one,
//! create one. Everything above it (throttling, retries, caching, serialized
//! read-modify-write) is layered here so that the repository never talks to a
//! backend directly.

mod bin;
mod cache;
mod jsonbin;
mod memory;
mod throttle;

pub use bin::*;
pub use cache::*;
pub use jsonbin::*;
pub use memory::*;
pub use throttle::*;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No API key configured for the store.
    #[error("store API key not configured")]
    MissingApiKey,

    /// The store rejected the request because of its rate limit.
    #[error("store rate limit exceeded")]
    RateLimited,

    /// The bin does not exist.
    #[error("bin {0} not found")]
    NotFound(String),

    /// Any other non-success status.
    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Network or protocol failure talking to the store.
    #[error("store transport error: {0}")]
    Transport(String),

    /// The stored document does not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Whether a retry with backoff may succeed.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

/// A key-value store of whole JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch the current record of a bin. `Value::Null` when the bin holds no record.
    async fn fetch(&self, bin_id: &str) -> Result<Value, StoreError>;

    /// Overwrite the record of a bin.
    async fn put(&self, bin_id: &str, record: &Value) -> Result<(), StoreError>;

    /// Create a new bin holding `record` and return its id.
    async fn create(&self, record: &Value) -> Result<String, StoreError>;
}
