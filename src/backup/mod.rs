//! Periodic snapshots of the store documents.
//!
//! A run takes the directory lock, fetches both documents, writes them to a
//! timestamped file and optionally uploads that file to Google Drive. Failures
//! are logged and recorded in `backup-state.json`; they never propagate.

mod drive;
mod lock;
mod schedule;
mod state;

pub use drive::*;
pub use lock::*;
pub use schedule::*;
pub use state::*;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::BackupConfig;
use crate::data::ResolvedBins;
use crate::store::{DocumentStore, StoreError};

pub const STATE_FILE: &str = "backup-state.json";
pub const LOCK_FILE: &str = "backup.lock";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Drive upload failed: {0}")]
    Drive(String),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::Drive(err.to_string())
    }
}

/// Contents of a backup file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub timestamp: DateTime<Utc>,
    pub main_doc_id: Option<String>,
    pub votes_doc_id: Option<String>,
    pub main: Value,
    /// Null when the votes document could not be fetched.
    pub votes: Value,
}

/// Result of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed { file: String },
    /// Another run holds the lock.
    Skipped,
    Failed(String),
}

impl BackupOutcome {
    /// Process exit code for the one-shot CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupOutcome::Completed { .. } | BackupOutcome::Skipped => 0,
            BackupOutcome::Failed(_) => 1,
        }
    }
}

/// `backup-<timestamp>.json` with `:` and `.` replaced so the name is portable.
pub fn backup_filename(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("backup-{}.json", stamp)
}

struct LocalBackup {
    path: PathBuf,
    filename: String,
}

pub struct BackupService {
    config: BackupConfig,
    source: Arc<dyn DocumentStore>,
    bins: ResolvedBins,
    uploader: Option<Arc<dyn BackupUploader>>,
    state: StateFile,
}

impl BackupService {
    /// Build the service, with a Drive uploader when credentials are configured.
    pub fn new(
        config: BackupConfig,
        source: Arc<dyn DocumentStore>,
        bins: ResolvedBins,
    ) -> Result<Self, BackupError> {
        let uploader: Option<Arc<dyn BackupUploader>> = match &config.drive {
            Some(credentials) if config.strategy.uploads_to_drive() => {
                Some(Arc::new(GoogleDriveUploader::new(
                    credentials.clone(),
                    config.drive_folder_id.clone(),
                    DriveEndpoints::default(),
                )?))
            }
            _ => None,
        };

        Ok(Self {
            state: StateFile::new(config.dir.join(STATE_FILE)),
            config,
            source,
            bins,
            uploader,
        })
    }

    #[cfg(test)]
    pub fn with_uploader(mut self, uploader: Arc<dyn BackupUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    fn lock_path(&self) -> PathBuf {
        self.config.dir.join(LOCK_FILE)
    }

    /// Run a backup if the last success is too old. Returns the outcome if one ran.
    pub async fn catch_up_at_startup(&self) -> Option<BackupOutcome> {
        match self.check_catch_up().await {
            Ok(decision) if !decision.should_run() => {
                tracing::info!("Recent backup exists, skipping startup catch-up");
                None
            }
            Ok(decision) => {
                match decision {
                    CatchUp::Initial => tracing::info!("No previous backup, running now"),
                    CatchUp::Missed { intervals } => tracing::warn!(
                        missed = intervals,
                        "Missed scheduled backups, running catch-up now"
                    ),
                    _ => tracing::info!("Last backup is older than the grace window, running now"),
                }
                Some(self.perform_backup().await)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Startup backup check failed, running a backup anyway");
                Some(self.perform_backup().await)
            }
        }
    }

    async fn check_catch_up(&self) -> Result<CatchUp, BackupError> {
        tokio::fs::create_dir_all(&self.config.dir).await?;
        if clear_stale_lock(&self.lock_path(), self.config.lock_stale).await? {
            tracing::warn!("Removed stale backup lock at startup");
        }

        let state = self.state.read().await;
        Ok(catchup_decision(
            state.last_success,
            Utc::now(),
            self.config.catchup_grace,
            self.config.interval,
        ))
    }

    /// Run one backup. Never fails; the outcome is also persisted in the state file.
    pub async fn perform_backup(&self) -> BackupOutcome {
        let started = Instant::now();
        tracing::info!(
            strategy = ?self.config.strategy,
            dry_run = self.config.dry_run,
            "Starting backup"
        );

        let lock = match self.acquire_lock().await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::warn!("Another backup is in progress, skipping this run");
                return BackupOutcome::Skipped;
            }
            Err(e) => return self.record_failure(e, started).await,
        };

        let result = self.run_locked().await;
        lock.release().await;

        match result {
            Ok(file) => {
                tracing::info!(
                    file = %file,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backup finished"
                );
                BackupOutcome::Completed { file }
            }
            Err(e) => self.record_failure(e, started).await,
        }
    }

    async fn acquire_lock(&self) -> Result<Option<BackupLock>, BackupError> {
        tokio::fs::create_dir_all(&self.config.dir).await?;
        BackupLock::acquire(&self.lock_path(), self.config.lock_stale).await
    }

    async fn record_failure(&self, error: BackupError, started: Instant) -> BackupOutcome {
        tracing::error!(
            error = %error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backup failed"
        );
        let message = error.to_string();
        if let Err(e) = self
            .state
            .update(|s| s.last_error = Some(message.clone()))
            .await
        {
            tracing::error!(error = %e, "Could not record backup failure");
        }
        BackupOutcome::Failed(message)
    }

    async fn run_locked(&self) -> Result<String, BackupError> {
        self.state
            .update(|s| {
                s.last_attempt = Some(Utc::now());
                s.last_error = None;
            })
            .await?;

        let record = self.build_record().await?;
        let local = self.write_local(&record).await?;

        if self.config.strategy.uploads_to_drive() {
            let uploaded = self.upload(&local).await?;
            if uploaded && !self.config.strategy.keeps_local() {
                match tokio::fs::remove_file(&local.path).await {
                    Ok(()) => tracing::info!(file = %local.filename, "Removed local copy after upload"),
                    Err(e) => tracing::warn!(error = %e, "Could not remove local copy"),
                }
            }
        }

        let filename = local.filename;
        self.state
            .update(|s| {
                s.last_success = Some(Utc::now());
                s.last_file = Some(filename.clone());
                s.last_error = None;
            })
            .await?;
        Ok(filename)
    }

    async fn build_record(&self) -> Result<BackupRecord, BackupError> {
        let timestamp = Utc::now();

        if self.config.dry_run {
            tracing::warn!("Dry run enabled, skipping store fetch");
            let placeholder = json!({ "mock": true, "note": "dry run, no network calls made" });
            return Ok(BackupRecord {
                timestamp,
                main_doc_id: self.bins.main.clone(),
                votes_doc_id: self.bins.votes.clone(),
                main: placeholder.clone(),
                votes: placeholder,
            });
        }

        let main_id = self
            .bins
            .main
            .as_deref()
            .ok_or(BackupError::NotConfigured("JSONBIN_BIN_ID"))?;
        let main = self.source.fetch(main_id).await?;

        let votes = match self.bins.votes.as_deref() {
            Some(votes_id) => match self.source.fetch(votes_id).await {
                Ok(votes) => votes,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not fetch votes bin, continuing without it");
                    Value::Null
                }
            },
            None => {
                tracing::info!("No votes bin configured, votes are part of the main document");
                Value::Null
            }
        };

        Ok(BackupRecord {
            timestamp,
            main_doc_id: Some(main_id.to_string()),
            votes_doc_id: self.bins.votes.clone(),
            main,
            votes,
        })
    }

    async fn write_local(&self, record: &BackupRecord) -> Result<LocalBackup, BackupError> {
        let filename = backup_filename(record.timestamp);
        let path = self.config.dir.join(&filename);
        let body = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &body).await?;

        tracing::info!(file = %path.display(), bytes = body.len(), "Wrote local backup");
        Ok(LocalBackup { path, filename })
    }

    /// Returns true when the file reached Drive.
    async fn upload(&self, local: &LocalBackup) -> Result<bool, BackupError> {
        if self.config.dry_run {
            tracing::warn!("Dry run enabled, skipping Google Drive upload");
            return Ok(false);
        }
        let Some(uploader) = &self.uploader else {
            tracing::warn!("Google Drive upload skipped, credentials missing");
            return Ok(false);
        };

        uploader.upload(&local.path, &local.filename).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupStrategy;
    use crate::store::MemoryStore;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Backups in `dir`, oldest first.
    fn list_backups(dir: &Path) -> std::io::Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("backup-") && name.ends_with(".json") && name != STATE_FILE)
            .collect();
        names.sort();
        Ok(names)
    }

    fn config(dir: &Path, strategy: BackupStrategy, dry_run: bool) -> BackupConfig {
        BackupConfig {
            dir: dir.to_path_buf(),
            strategy,
            dry_run,
            catchup_grace: Duration::from_secs(15 * 60),
            lock_stale: Duration::from_secs(60 * 60),
            interval: Duration::from_secs(6 * 3600),
            run_on_serve: false,
            drive: None,
            drive_folder_id: None,
        }
    }

    fn bins(main: Option<&str>, votes: Option<&str>) -> ResolvedBins {
        ResolvedBins {
            main: main.map(str::to_string),
            votes: votes.map(str::to_string),
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploaded: Mutex<Vec<(Value, String)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl BackupUploader for RecordingUploader {
        async fn upload(&self, path: &Path, filename: &str) -> Result<UploadedFile, BackupError> {
            if self.fail {
                return Err(BackupError::Drive("quota exceeded".to_string()));
            }
            let body: Value = serde_json::from_slice(&std::fs::read(path)?)?;
            self.uploaded
                .lock()
                .unwrap()
                .push((body, filename.to_string()));
            Ok(UploadedFile {
                id: "drive-1".to_string(),
                name: Some(filename.to_string()),
                web_view_link: None,
            })
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert("main", json!({ "candidates": [{ "id": "c1", "name": "Max" }] }))
            .await;
        store
            .insert("votes", json!({ "users": { "Anna": [] } }))
            .await;
        store
    }

    #[test]
    fn test_backup_filename_is_portable() {
        let at = DateTime::parse_from_rfc3339("2024-06-01T10:30:00.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(backup_filename(at), "backup-2024-06-01T10-30-00-123Z.json");
    }

    #[tokio::test]
    async fn test_backup_writes_both_documents() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store().await;
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Local, false),
            Arc::new(store),
            bins(Some("main"), Some("votes")),
        )
        .unwrap();

        let BackupOutcome::Completed { file } = service.perform_backup().await else {
            panic!("backup did not complete");
        };

        let record: BackupRecord =
            serde_json::from_slice(&std::fs::read(dir.path().join(&file)).unwrap()).unwrap();
        assert_eq!(record.main_doc_id.as_deref(), Some("main"));
        assert_eq!(record.main["candidates"][0]["name"], "Max");
        assert_eq!(record.votes["users"]["Anna"], json!([]));

        let state = service.state().read().await;
        assert!(state.last_success.is_some());
        assert!(state.last_attempt.is_some());
        assert_eq!(state.last_file.as_deref(), Some(file.as_str()));
        assert!(state.last_error.is_none());
        assert!(!dir.path().join(LOCK_FILE).exists());
        assert_eq!(list_backups(dir.path()).unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn test_missing_votes_bin_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store().await;
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Local, false),
            Arc::new(store),
            bins(Some("main"), Some("gone")),
        )
        .unwrap();

        let BackupOutcome::Completed { file } = service.perform_backup().await else {
            panic!("backup did not complete");
        };
        let record: BackupRecord =
            serde_json::from_slice(&std::fs::read(dir.path().join(file)).unwrap()).unwrap();
        assert!(record.votes.is_null());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_recorded() {
        let dir = TempDir::new().unwrap();
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Local, false),
            Arc::new(MemoryStore::new()),
            bins(Some("main"), None),
        )
        .unwrap();

        let outcome = service.perform_backup().await;
        assert!(matches!(outcome, BackupOutcome::Failed(_)));
        assert_eq!(outcome.exit_code(), 1);

        let state = service.state().read().await;
        assert!(state.last_error.is_some());
        assert!(state.last_success.is_none());
        assert!(!dir.path().join(LOCK_FILE).exists());
        assert!(list_backups(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_store_calls() {
        let dir = TempDir::new().unwrap();
        // An empty store would fail any fetch.
        let uploader = Arc::new(RecordingUploader::default());
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Both, true),
            Arc::new(MemoryStore::new()),
            bins(Some("main"), None),
        )
        .unwrap()
        .with_uploader(uploader.clone());

        let BackupOutcome::Completed { file } = service.perform_backup().await else {
            panic!("dry run did not complete");
        };
        let record: BackupRecord =
            serde_json::from_slice(&std::fs::read(dir.path().join(file)).unwrap()).unwrap();
        assert_eq!(record.main["mock"], true);
        assert!(uploader.uploaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drive_only_removes_local_copy() {
        let dir = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Drive, false),
            Arc::new(seeded_store().await),
            bins(Some("main"), Some("votes")),
        )
        .unwrap()
        .with_uploader(uploader.clone());

        let BackupOutcome::Completed { file } = service.perform_backup().await else {
            panic!("backup did not complete");
        };

        let uploaded = uploader.uploaded.lock().unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].1, file);
        assert_eq!(uploaded[0].0["main"]["candidates"][0]["id"], "c1");
        assert!(list_backups(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_local_copy() {
        let dir = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader {
            fail: true,
            ..Default::default()
        });
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Drive, false),
            Arc::new(seeded_store().await),
            bins(Some("main"), None),
        )
        .unwrap()
        .with_uploader(uploader);

        assert!(matches!(
            service.perform_backup().await,
            BackupOutcome::Failed(_)
        ));
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    /// Captures the persisted state at the moment the upload happens.
    struct StateReadingUploader {
        state: StateFile,
        seen: Mutex<Option<BackupState>>,
    }

    #[async_trait::async_trait]
    impl BackupUploader for StateReadingUploader {
        async fn upload(&self, _path: &Path, filename: &str) -> Result<UploadedFile, BackupError> {
            let current = self.state.read().await;
            *self.seen.lock().unwrap() = Some(current);
            Ok(UploadedFile {
                id: "drive-2".to_string(),
                name: Some(filename.to_string()),
                web_view_link: None,
            })
        }
    }

    #[tokio::test]
    async fn test_new_attempt_clears_previous_error() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::new(dir.path().join(STATE_FILE));
        state
            .update(|s| s.last_error = Some("quota exceeded".to_string()))
            .await
            .unwrap();

        let uploader = Arc::new(StateReadingUploader {
            state: state.clone(),
            seen: Mutex::new(None),
        });
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Both, false),
            Arc::new(seeded_store().await),
            bins(Some("main"), None),
        )
        .unwrap()
        .with_uploader(uploader.clone());

        assert!(matches!(
            service.perform_backup().await,
            BackupOutcome::Completed { .. }
        ));

        let during = uploader.seen.lock().unwrap().clone().unwrap();
        assert!(during.last_attempt.is_some());
        assert!(during.last_error.is_none());
        assert!(during.last_success.is_none());
    }

    #[tokio::test]
    async fn test_held_lock_skips_run() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "{}").unwrap();
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Local, true),
            Arc::new(MemoryStore::new()),
            bins(None, None),
        )
        .unwrap();

        let outcome = service.perform_backup().await;
        assert_eq!(outcome, BackupOutcome::Skipped);
        assert_eq!(outcome.exit_code(), 0);
        assert!(dir.path().join(LOCK_FILE).exists());
        assert_eq!(service.state().read().await, BackupState::default());
    }

    #[tokio::test]
    async fn test_startup_catch_up() {
        let dir = TempDir::new().unwrap();
        let service = BackupService::new(
            config(dir.path(), BackupStrategy::Local, true),
            Arc::new(MemoryStore::new()),
            bins(None, None),
        )
        .unwrap();

        // No history: runs.
        assert!(matches!(
            service.catch_up_at_startup().await,
            Some(BackupOutcome::Completed { .. })
        ));
        // Just succeeded: skips.
        assert!(service.catch_up_at_startup().await.is_none());

        // Last success 8 hours ago: runs again.
        service
            .state()
            .update(|s| s.last_success = Some(Utc::now() - chrono::Duration::hours(8)))
            .await
            .unwrap();
        assert!(service.catch_up_at_startup().await.is_some());
    }
}
