//! Persisted run state and atomic file writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::BackupError;

/// Outcome of the latest backup attempts, kept across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupState {
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_file: Option<String>,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
///
/// Readers of `path` see either the previous contents or the new ones.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await
}

/// The `backup-state.json` file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state. A missing or unreadable file counts as no history.
    pub async fn read(&self) -> BackupState {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BackupState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read backup state");
                return BackupState::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Backup state is corrupt, starting fresh");
            BackupState::default()
        })
    }

    /// Apply `change` on top of the stored state and persist the result.
    pub async fn update(
        &self,
        change: impl FnOnce(&mut BackupState),
    ) -> Result<BackupState, BackupError> {
        let mut state = self.read().await;
        change(&mut state);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&state)?).await?;
        Ok(state)
    }
}
