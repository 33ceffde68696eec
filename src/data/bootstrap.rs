//! Startup check of the configured bins.

use serde::Serialize;

use crate::models::{MainDocument, VotesDocument};
use crate::store::{StoreError, StoreGateway};

/// Bin ids in effect after startup, including any that had to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBins {
    pub main: Option<String>,
    pub votes: Option<String>,
}

/// Make sure a bin exists, creating it with `default` when the store reports it missing.
///
/// Returns the id to use. An unset id stays unset unless `create_unset` is true.
pub async fn ensure_bin<D: Serialize>(
    gateway: &StoreGateway,
    label: &str,
    bin_id: Option<&str>,
    default: &D,
    create_unset: bool,
) -> Result<Option<String>, StoreError> {
    let existing = match bin_id.filter(|id| !id.is_empty()) {
        Some(id) => match gateway.fetch(id).await {
            Ok(_) => {
                tracing::info!(bin = label, bin_id = id, "Bin exists and is accessible");
                return Ok(Some(id.to_string()));
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(bin = label, bin_id = id, "Bin not found, creating a new one");
                Some(id)
            }
            Err(e) => return Err(e),
        },
        None if create_unset => None,
        None => {
            tracing::warn!(bin = label, "Bin id not configured");
            return Ok(None);
        }
    };

    let record = serde_json::to_value(default)?;
    let new_id = gateway.create(&record).await?;
    if existing.is_some() {
        tracing::warn!(
            bin = label,
            bin_id = %new_id,
            "Created replacement bin; persist {}={} in your environment",
            if label == "main" { "JSONBIN_BIN_ID" } else { "JSONBIN_VOTES_BIN_ID" },
            new_id
        );
    } else {
        tracing::info!(bin = label, bin_id = %new_id, "Created bin");
    }
    Ok(Some(new_id))
}

/// Check both bins. The votes bin is optional; without it votes live in the
/// main document (legacy mode).
pub async fn resolve_bins(
    gateway: &StoreGateway,
    main: Option<&str>,
    votes: Option<&str>,
    create_unset: bool,
) -> Result<ResolvedBins, StoreError> {
    let main = ensure_bin(gateway, "main", main, &MainDocument::default(), create_unset).await?;
    let votes = ensure_bin(
        gateway,
        "votes",
        votes,
        &VotesDocument::default(),
        create_unset,
    )
    .await?;

    if votes.is_none() {
        tracing::warn!("Votes bin not configured; votes are stored in the main bin (legacy mode)");
    }

    Ok(ResolvedBins { main, votes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore, RetryPolicy};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway(store: &MemoryStore) -> StoreGateway {
        StoreGateway::new(
            Arc::new(store.clone()),
            Duration::ZERO,
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_existing_bins_are_kept() {
        let store = MemoryStore::new();
        store.insert("main-id", json!({})).await;
        store.insert("votes-id", json!({ "users": {} })).await;

        let bins = resolve_bins(&gateway(&store), Some("main-id"), Some("votes-id"), false)
            .await
            .unwrap();
        assert_eq!(bins.main.as_deref(), Some("main-id"));
        assert_eq!(bins.votes.as_deref(), Some("votes-id"));
    }

    #[tokio::test]
    async fn test_missing_bin_is_recreated_with_defaults() {
        let store = MemoryStore::new();
        let bins = resolve_bins(&gateway(&store), Some("gone"), None, false)
            .await
            .unwrap();

        let new_id = bins.main.unwrap();
        assert_ne!(new_id, "gone");
        assert_eq!(
            store.fetch(&new_id).await.unwrap(),
            json!({ "votes": [], "candidates": [], "slotNotes": [], "appointments": [] })
        );
        assert_eq!(bins.votes, None);
    }

    #[tokio::test]
    async fn test_unset_ids_created_on_request() {
        let store = MemoryStore::new();
        let bins = resolve_bins(&gateway(&store), None, None, true).await.unwrap();

        let votes_id = bins.votes.unwrap();
        assert_eq!(store.fetch(&votes_id).await.unwrap(), json!({ "users": {} }));
        assert!(bins.main.is_some());
    }
}
