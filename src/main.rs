//! WG Casting Backend
//!
//! REST backend for the flat-share casting planner. Data lives in a remote
//! JSON document store; a backup job snapshots it to disk and Google Drive.

mod api;
mod backup;
mod config;
mod data;
mod errors;
mod models;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use backup::BackupService;
use config::{Config, StoreBackend, StoreConfig};
use data::{resolve_bins, Repository, ResolvedBins};
use store::{DocumentStore, JsonBinStore, MemoryStore, RetryPolicy, StoreError, StoreGateway};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[derive(Debug, Parser)]
#[command(name = "wg-casting-backend", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Backup operations
    Backup {
        #[command(subcommand)]
        action: BackupCommand,
    },
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Run one backup now
    Run {
        /// Write placeholder content without touching the network
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the startup catch-up and then back up on every interval until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Backup {
            action: BackupCommand::Run { dry_run },
        } => {
            config.backup.dry_run |= dry_run;
            return run_backup_once(config).await;
        }
        Command::Backup {
            action: BackupCommand::Schedule,
        } => run_schedule(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::JsonBin => Arc::new(JsonBinStore::new(
            config.base_url.clone(),
            config.api_key.clone(),
        )?),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

fn configured_bins(config: &StoreConfig) -> ResolvedBins {
    ResolvedBins {
        main: config.main_bin_id.clone(),
        votes: config.votes_bin_id.clone(),
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting WG casting backend");
    tracing::info!("Store: {:?}", config.store);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.store.backend == StoreBackend::JsonBin && config.store.api_key.is_none() {
        tracing::warn!("JSONBIN_API_KEY is not set; reads will be empty and writes will fail");
    }

    let store = build_store(&config.store)?;
    let gateway = Arc::new(StoreGateway::new(
        store.clone(),
        config.store.min_interval,
        RetryPolicy {
            max_attempts: config.store.max_attempts,
            ..RetryPolicy::default()
        },
    ));

    // Bins are created on demand only for the throwaway in-memory store.
    let bins = match resolve_bins(
        &gateway,
        config.store.main_bin_id.as_deref(),
        config.store.votes_bin_id.as_deref(),
        config.store.backend == StoreBackend::Memory,
    )
    .await
    {
        Ok(bins) => bins,
        Err(e) => {
            tracing::error!(error = %e, "Could not verify bins, continuing with configured ids");
            configured_bins(&config.store)
        }
    };

    let repo = Arc::new(Repository::new(gateway, &bins, config.store.cache_ttl));
    tracing::info!(
        votes_bin = repo.uses_votes_bin(),
        "Repository ready"
    );

    let schedule = if config.backup.run_on_serve {
        let service = BackupService::new(config.backup.clone(), store, bins)?;
        Some(backup::start_schedule(Arc::new(service)))
    } else {
        None
    };

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = schedule {
        handle.abort();
    }
    Ok(())
}

/// One-shot backup. Exit code 0 on success or lock contention, 1 on failure,
/// 2 when the store is not configured.
async fn run_backup_once(config: Config) -> ExitCode {
    if !config.backup.dry_run {
        let missing_key =
            config.store.backend == StoreBackend::JsonBin && config.store.api_key.is_none();
        if missing_key || config.store.main_bin_id.is_none() {
            tracing::error!("Missing JSONBIN_API_KEY or JSONBIN_BIN_ID");
            return ExitCode::from(2);
        }
    }

    let service = match build_store(&config.store)
        .map_err(backup::BackupError::from)
        .and_then(|store| {
            BackupService::new(config.backup.clone(), store, configured_bins(&config.store))
        }) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Could not set up backup");
            return ExitCode::from(2);
        }
    };

    let outcome = service.perform_backup().await;
    let state = service.state().read().await;
    tracing::info!(
        ?outcome,
        last_success = ?state.last_success,
        last_file = ?state.last_file,
        "Backup run finished"
    );
    ExitCode::from(outcome.exit_code())
}

async fn run_schedule(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = build_store(&config.store)?;
    let service = BackupService::new(
        config.backup.clone(),
        store,
        configured_bins(&config.store),
    )?;

    let handle = backup::start_schedule(Arc::new(service));
    shutdown_signal().await;
    handle.abort();
    tracing::info!("Backup schedule stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Votes
        .route("/votes", get(api::list_votes))
        .route("/votes", post(api::submit_votes))
        .route("/votes", put(api::replace_votes))
        .route("/usernames", get(api::list_usernames))
        .route("/heatmap", get(api::get_heatmap))
        // Candidates
        .route("/candidates", get(api::list_candidates))
        .route("/candidates", put(api::replace_candidates))
        .route("/candidates", post(api::create_candidate))
        .route("/candidates/{id}", put(api::update_candidate))
        .route("/candidates/{id}", delete(api::delete_candidate))
        .route("/candidates/{id}/votes", post(api::vote_candidate))
        .route("/candidates/{id}/notes", post(api::add_candidate_note))
        // Slot notes
        .route("/slot-notes", get(api::list_slot_notes))
        .route("/slot-notes", put(api::replace_slot_notes))
        .route("/slot-notes", post(api::upsert_slot_notes))
        // Appointments
        .route("/appointments", get(api::list_appointments))
        .route("/appointments", put(api::replace_appointments))
        .route("/appointments", post(api::create_appointment))
        .route("/appointments/{id}", put(api::update_appointment))
        .route("/appointments/{id}", delete(api::delete_appointment))
        .route(
            "/appointments/{id}/comments",
            post(api::add_appointment_comment),
        )
        // Debug
        .route("/cache/invalidate", post(api::invalidate_cache));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "store": format!("{:?}", state.config.store.backend),
        "votesBin": state.repo.uses_votes_bin(),
    }))
}
