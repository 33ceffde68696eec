//! Configuration module for the WG casting backend.
//!
//! All configuration is loaded from environment variables (and an optional
//! `.env` file) with sensible defaults. It is resolved once at startup and
//! passed down as a value.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::store::DEFAULT_CACHE_TTL;

/// A configuration value that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid value for {name}: '{value}'")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

/// Which document store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    JsonBin,
    /// In-process bins, lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonbin" => Ok(StoreBackend::JsonBin),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Where backups end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStrategy {
    Local,
    Drive,
    Both,
}

impl BackupStrategy {
    pub fn keeps_local(self) -> bool {
        matches!(self, BackupStrategy::Local | BackupStrategy::Both)
    }

    pub fn uploads_to_drive(self) -> bool {
        matches!(self, BackupStrategy::Drive | BackupStrategy::Both)
    }
}

impl FromStr for BackupStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackupStrategy::Local),
            "drive" => Ok(BackupStrategy::Drive),
            "both" => Ok(BackupStrategy::Both),
            _ => Err(()),
        }
    }
}

/// OAuth client credentials for Google Drive uploads.
#[derive(Clone)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Remote document store settings.
#[derive(Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub api_key: Option<String>,
    pub base_url: String,
    pub main_bin_id: Option<String>,
    /// Unset means votes live in the main document.
    pub votes_bin_id: Option<String>,
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub cache_ttl: Duration,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("api_key_set", &self.api_key.is_some())
            .field("base_url", &self.base_url)
            .field("main_bin_id", &self.main_bin_id)
            .field("votes_bin_id", &self.votes_bin_id)
            .field("min_interval", &self.min_interval)
            .field("max_attempts", &self.max_attempts)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

/// Backup scheduler settings.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub strategy: BackupStrategy,
    pub dry_run: bool,
    /// Skip the startup backup if the last success is younger than this.
    pub catchup_grace: Duration,
    /// Locks older than this are treated as left behind by a crashed run.
    pub lock_stale: Duration,
    pub interval: Duration,
    /// Start the schedule inside the HTTP server process.
    pub run_on_serve: bool,
    pub drive: Option<DriveCredentials>,
    pub drive_folder_id: Option<String>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub store: StoreConfig,
    pub backup: BackupConfig,
}

/// Non-empty environment variable.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { name, value }),
        None => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    var(name).is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_addr = parse_var("WG_BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)))?;
        let log_level = var("WG_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let store = StoreConfig {
            backend: parse_var("WG_STORE_BACKEND", StoreBackend::JsonBin)?,
            api_key: var("JSONBIN_API_KEY"),
            base_url: var("JSONBIN_BASE_URL")
                .unwrap_or_else(|| "https://api.jsonbin.io/v3".to_string()),
            main_bin_id: var("JSONBIN_BIN_ID"),
            votes_bin_id: var("JSONBIN_VOTES_BIN_ID"),
            min_interval: Duration::from_millis(parse_var("JSONBIN_MIN_INTERVAL_MS", 1000)?),
            max_attempts: parse_var("JSONBIN_MAX_ATTEMPTS", 3u32)?.max(1),
            cache_ttl: Duration::from_secs(parse_var(
                "JSONBIN_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
        };

        let drive = match (
            var("GOOGLE_CLIENT_ID"),
            var("GOOGLE_CLIENT_SECRET"),
            var("GOOGLE_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(DriveCredentials {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => None,
        };

        let interval_hours: u64 = parse_var("BACKUP_INTERVAL_HOURS", 6)?;
        if interval_hours == 0 || 24 % interval_hours != 0 {
            return Err(ConfigError {
                name: "BACKUP_INTERVAL_HOURS",
                value: interval_hours.to_string(),
            });
        }

        let backup = BackupConfig {
            dir: var("BACKUP_DIR")
                .unwrap_or_else(|| "./backups".to_string())
                .into(),
            strategy: parse_var("BACKUP_STRATEGY", BackupStrategy::Both)?,
            dry_run: flag("BACKUP_DRY_RUN"),
            catchup_grace: Duration::from_secs(
                parse_var("BACKUP_CATCHUP_GRACE_MINUTES", 15u64)? * 60,
            ),
            lock_stale: Duration::from_secs(parse_var("BACKUP_LOCK_STALE_MINUTES", 60u64)? * 60),
            interval: Duration::from_secs(interval_hours * 3600),
            run_on_serve: flag("BACKUP_ON_SERVE"),
            drive,
            drive_folder_id: var("GOOGLE_DRIVE_FOLDER_ID"),
        };

        Ok(Self {
            bind_addr,
            log_level,
            store,
            backup,
        })
    }
}
