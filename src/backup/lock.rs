//! Cross-process backup lock based on an exclusive marker file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::BackupError;

/// Contents of the lock marker.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Create the marker, failing with `AlreadyExists` if it is present.
async fn create_marker(path: &Path, note: Option<&str>) -> std::io::Result<()> {
    let info = LockInfo {
        pid: std::process::id(),
        since: Utc::now(),
        note: note.map(str::to_string),
    };
    let body = serde_json::to_vec_pretty(&info)?;

    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    fill_marker(path, file, &body).await
}

/// Write the marker body. A marker left empty would block every later run,
/// so it is removed again when the write fails.
async fn fill_marker<W>(path: &Path, mut writer: W, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(body).await?;
        writer.flush().await
    }
    .await;
    drop(writer);

    if let Err(e) = written {
        if let Err(cleanup) = remove_marker(path).await {
            tracing::warn!(error = %cleanup, "Could not remove partial backup lock");
        }
        return Err(e);
    }
    Ok(())
}

async fn remove_marker(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Time since the marker was last modified.
pub async fn lock_age(path: &Path) -> std::io::Result<Duration> {
    let modified = fs::metadata(path).await?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Remove the marker if it is older than `stale_after`. Returns true if removed.
pub async fn clear_stale_lock(path: &Path, stale_after: Duration) -> std::io::Result<bool> {
    match lock_age(path).await {
        Ok(age) if age > stale_after => {
            remove_marker(path).await?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// A held backup lock. Must be released with [`BackupLock::release`].
#[derive(Debug)]
pub struct BackupLock {
    path: PathBuf,
}

impl BackupLock {
    /// Try to take the lock.
    ///
    /// `Ok(None)` means another run holds a lock younger than `stale_after`.
    /// An older lock is assumed to belong to a crashed run and is replaced. Two
    /// processes racing on the same stale lock may both succeed; that only
    /// costs a duplicate backup.
    pub async fn acquire(path: &Path, stale_after: Duration) -> Result<Option<Self>, BackupError> {
        match create_marker(path, None).await {
            Ok(()) => return Ok(Some(Self::held(path))),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let note = match lock_age(path).await {
            Ok(age) if age <= stale_after => return Ok(None),
            Ok(age) => {
                tracing::warn!(
                    age_secs = age.as_secs(),
                    "Stale backup lock detected, forcing unlock"
                );
                "recovered stale lock"
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not inspect backup lock, recovering");
                "recovered lock (stat failed)"
            }
        };

        remove_marker(path).await?;
        match create_marker(path, Some(note)).await {
            Ok(()) => Ok(Some(Self::held(path))),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn held(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub async fn release(self) {
        if let Err(e) = remove_marker(&self.path).await {
            tracing::warn!(error = %e, "Failed to release backup lock");
        }
    }
}
