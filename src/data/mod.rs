//! Domain data access on top of the remote document store.
//!
//! The store is the source of truth for all application data. Reads tolerate
//! store failures and fall back to empty collections; writes go through the
//! per-bin serializer and report failures to the caller.

mod bootstrap;
mod repository;

pub use bootstrap::*;
pub use repository::*;

use thiserror::Error;

use crate::store::StoreError;

/// Errors from domain write operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A required bin id is missing from the configuration.
    #[error("{0} bin is not configured")]
    NotConfigured(&'static str),

    /// The addressed entity does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
