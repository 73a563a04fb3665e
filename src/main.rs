//! PlantWatch - equipment telemetry anomaly detection and alerting
//!
//! # Usage
//!
//! ```bash
//! # Run with the synthetic load generator and a sled store in ./data
//! cargo run --release
//!
//! # In-memory store, no generator, custom address
//! ./plantwatch --memory --no-generator --addr 127.0.0.1:9000
//!
//! # Explicit config file
//! ./plantwatch --config /etc/plantwatch/plantwatch.toml
//! ```
//!
//! # Environment Variables
//!
//! - `PLANTWATCH_CONFIG`: Path to the TOML config (when `--config` is absent)
//! - `PLANTWATCH_SERVER_ADDR`: HTTP bind address override
//! - `PLANTWATCH_CORS_ORIGINS`: Comma-separated allowed dashboard origins
//! - `PLANTWATCH_LOG_FORMAT`: Set to "json" for JSON log lines
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe all persistent data on startup

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use plantwatch::api::{create_app, ApiState};
use plantwatch::config::{self, PlantConfig, StorageBackend};
use plantwatch::generator::{default_profiles, SyntheticLoadGenerator};
use plantwatch::notify::{run_status_broadcaster, NotificationFanout};
use plantwatch::storage::{InMemoryStore, PersistenceLayer, SledStore};
use plantwatch::types::default_fleet;
use plantwatch::{EquipmentHealthRegistry, IngestionPipeline};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plantwatch")]
#[command(about = "PlantWatch equipment anomaly detection and alerting service")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default from config: "0.0.0.0:8000")
    #[arg(short, long, env = "PLANTWATCH_SERVER_ADDR")]
    addr: Option<String>,

    /// Path to a plantwatch.toml (takes precedence over PLANTWATCH_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep all data in memory; nothing survives a restart
    #[arg(long)]
    memory: bool,

    /// Disable the synthetic load generator
    #[arg(long)]
    no_generator: bool,

    /// Seed the load generator RNG for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Reset all persistent data (readings, alerts, predictions) on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("PLANTWATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Database Reset
// ============================================================================

/// A reset is requested by `--reset-db` or a truthy `RESET_DB`.
fn should_reset_db(cli_flag: bool) -> bool {
    cli_flag
        || std::env::var("RESET_DB").is_ok_and(|v| {
            matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        })
}

/// Remove the sled database directory and all its contents.
fn reset_data_directory(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        info!("Database directory does not exist, nothing to reset");
        return Ok(());
    }

    warn!("RESET_DB requested: wiping persistent data at {}", db_path.display());
    std::fs::remove_dir_all(db_path)
        .with_context(|| format!("Failed to remove {}", db_path.display()))?;
    warn!("Database removed, a fresh store will be created on startup");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    StatusBroadcaster,
    LoadGenerator,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::HttpServer => "HttpServer",
            Self::StatusBroadcaster => "StatusBroadcaster",
            Self::LoadGenerator => "LoadGenerator",
        })
    }
}

// ============================================================================
// Storage
// ============================================================================

struct OpenedStore {
    store: Arc<dyn PersistenceLayer>,
    /// Kept for the final flush
    sled: Option<SledStore>,
}

fn open_store(config: &PlantConfig) -> Result<OpenedStore> {
    match config.storage.backend {
        StorageBackend::Sled => {
            let sled = SledStore::open(&config.storage.path)
                .with_context(|| format!("Failed to open sled store at {}", config.storage.path))?;
            Ok(OpenedStore {
                store: Arc::new(sled.clone()),
                sled: Some(sled),
            })
        }
        StorageBackend::Memory => Ok(OpenedStore {
            store: Arc::new(InMemoryStore::new()),
            sled: None,
        }),
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Serve the dashboard API until the token is cancelled.
fn spawn_http_server(
    tasks: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    shutdown: CancellationToken,
) {
    tasks.spawn(async move {
        info!("[HttpServer] Accepting connections");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("[HttpServer] Draining connections");
            })
            .await
            .map_err(|e| {
                error!("[HttpServer] Serve failed: {}", e);
                anyhow::Error::new(e).context("HTTP server failed")
            })?;
        info!("[HttpServer] Stopped");
        Ok(TaskName::HttpServer)
    });
}

/// Watch the spawned tasks. The first failure or panic cancels the rest;
/// either way every task is joined before returning.
async fn run_supervisor(
    tasks: &mut JoinSet<Result<TaskName>>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Supervisor: watching {} tasks", tasks.len());

    let mut outcome = Ok(());
    while outcome.is_ok() {
        let joined = tokio::select! {
            () = shutdown.cancelled() => break,
            joined = tasks.join_next() => joined,
        };
        outcome = match joined {
            None => break,
            Some(Ok(Ok(task))) => {
                info!("Supervisor: {} finished", task);
                Ok(())
            }
            Some(Ok(Err(e))) => {
                error!("Supervisor: task failed: {:#}", e);
                Err(e)
            }
            Some(Err(e)) => {
                error!("Supervisor: task panicked: {}", e);
                Err(anyhow::anyhow!("task panicked: {}", e))
            }
        };
    }
    shutdown.cancel();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(task)) => info!("Supervisor: {} stopped", task),
            Ok(Err(e)) => warn!("Supervisor: task stopped with error: {:#}", e),
            Err(e) => warn!("Supervisor: task join error: {}", e),
        }
    }

    outcome
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = CliArgs::parse();

    let mut plant_config = PlantConfig::load_with_override(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        plant_config.server.addr = addr;
    }
    if args.memory {
        plant_config.storage.backend = StorageBackend::Memory;
    }
    if args.no_generator {
        plant_config.generator.enabled = false;
    }
    if args.seed.is_some() {
        plant_config.generator.seed = args.seed;
    }
    config::init(plant_config.clone());
    let plant_config = Arc::new(plant_config);

    info!("PlantWatch {} | plant: {}", env!("CARGO_PKG_VERSION"), plant_config.plant.name);

    // Reset DB check, before any storage initialization
    if plant_config.storage.backend == StorageBackend::Sled && should_reset_db(args.reset_db) {
        reset_data_directory(Path::new(&plant_config.storage.path))?;
    }

    let OpenedStore { store, sled } = open_store(&plant_config)?;
    info!("Storage backend: {}", store.backend_name());

    if store.list_equipment().context("Failed to list equipment")?.is_empty() {
        let seeded = store
            .seed_equipment(&default_fleet())
            .context("Failed to seed default fleet")?;
        info!("Seeded {} equipment units", seeded);
    }
    let units = store.list_equipment().context("Failed to list equipment")?;
    let health = Arc::new(EquipmentHealthRegistry::from_units(
        &units,
        plant_config.policy.recovery_clean_samples,
    ));
    info!("Monitoring {} equipment units", health.len());

    let fanout = Arc::new(NotificationFanout::new(&plant_config.notifications));
    let pipeline = Arc::new(IngestionPipeline::new(
        &plant_config,
        Arc::clone(&store),
        Arc::clone(&health),
        Arc::clone(&fanout),
    ));

    let cancel_token = CancellationToken::new();
    let ctrl_c = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                ctrl_c.cancel();
            }
            Err(e) => warn!("Could not install Ctrl+C handler: {}", e),
        }
    });

    let mut task_set = JoinSet::new();

    let listener = tokio::net::TcpListener::bind(&plant_config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", plant_config.server.addr))?;
    info!("HTTP server listening on {}", plant_config.server.addr);
    let app = create_app(ApiState::new(Arc::clone(&pipeline), Arc::clone(&plant_config)));
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    let status_interval = Duration::from_secs(plant_config.notifications.status_interval_secs);
    let status_cancel = cancel_token.clone();
    task_set.spawn(async move {
        run_status_broadcaster(health, fanout, status_interval, status_cancel).await;
        Ok(TaskName::StatusBroadcaster)
    });

    if plant_config.generator.enabled {
        let profiles = default_profiles()
            .into_iter()
            .filter(|p| pipeline.health().contains(p.equipment_id))
            .collect();
        let generator = SyntheticLoadGenerator::new(
            Arc::clone(&pipeline),
            profiles,
            plant_config.generator.clone(),
        );
        let generator_cancel = cancel_token.clone();
        task_set.spawn(async move {
            let report = generator.run(generator_cancel).await;
            info!(
                "[LoadGenerator] Stopped: {} cycles, {} readings, {} failures",
                report.cycles, report.submitted, report.failures
            );
            Ok(TaskName::LoadGenerator)
        });
    } else {
        info!("Load generator disabled");
    }

    let result = run_supervisor(&mut task_set, cancel_token).await;

    info!("{}", pipeline.stats());
    if let Some(sled) = sled {
        if let Err(e) = sled.flush() {
            warn!("Failed to flush sled store: {}", e);
        }
    }

    info!("PlantWatch shutdown complete");
    result
}
