//! Time-Series Lifecycle Engine
//!
//! Chunked storage with background lifecycle jobs:
//! - Time-partitioned chunks, compressed once past the hot window
//! - Retention with archival before deletion
//! - Continuous aggregates over a trailing window
//! - Dashboard composites and per-stream job health

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use api::{router, AppState};
use chunk_store::ArchivalLog;
use engine_core::{EntitySpec, StreamSpec};
use telemetry::init_tracing_from_env;
use worker::{LifecycleEngine, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// JSONL archival log; in memory when unset
    #[serde(default)]
    archival_log_path: Option<PathBuf>,

    #[serde(default)]
    workers: WorkersConfig,

    /// Streams registered at startup
    #[serde(default)]
    streams: Vec<StreamSpec>,

    /// Dashboard entities registered at startup
    #[serde(default)]
    entities: Vec<EntitySpec>,
}

/// Job loop intervals in seconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct WorkersConfig {
    compression_interval_secs: u64,
    retention_interval_secs: u64,
    aggregation_interval_secs: u64,
    max_concurrent_streams: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let defaults = WorkerConfig::default();
        Self {
            compression_interval_secs: defaults.compression_interval.as_secs(),
            retention_interval_secs: defaults.retention_interval.as_secs(),
            aggregation_interval_secs: defaults.aggregation_interval.as_secs(),
            max_concurrent_streams: defaults.max_concurrent_streams,
        }
    }
}

impl From<&WorkersConfig> for WorkerConfig {
    fn from(c: &WorkersConfig) -> Self {
        Self {
            compression_interval: Duration::from_secs(c.compression_interval_secs.max(1)),
            retention_interval: Duration::from_secs(c.retention_interval_secs.max(1)),
            aggregation_interval: Duration::from_secs(c.aggregation_interval_secs.max(1)),
            max_concurrent_streams: c.max_concurrent_streams.max(1),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            archival_log_path: None,
            workers: WorkersConfig::default(),
            streams: Vec::new(),
            entities: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Lifecycle Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let archival_log = match &config.archival_log_path {
        Some(path) => ArchivalLog::open(path)
            .await
            .with_context(|| format!("Failed to open archival log {}", path.display()))?,
        None => {
            warn!("No archival_log_path configured, archival records are kept in memory");
            ArchivalLog::in_memory()
        }
    };

    let engine = Arc::new(
        LifecycleEngine::builder()
            .config(WorkerConfig::from(&config.workers))
            .archival_log(Arc::new(archival_log))
            .build(),
    );

    let now = Utc::now();
    for spec in config.streams.clone() {
        let name = spec.name.clone();
        engine
            .register_stream(spec, now)
            .with_context(|| format!("Failed to register stream {}", name))?;
    }
    for spec in config.entities.clone() {
        let id = spec.id.clone();
        engine
            .register_entity(spec)
            .with_context(|| format!("Failed to register entity {}", id))?;
    }
    info!(
        streams = config.streams.len(),
        entities = config.entities.len(),
        "Registered configured streams and entities"
    );

    // Start background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(WorkerScheduler::new(engine.clone()));
    let worker_handles = scheduler.start(shutdown_rx);

    let app = router(AppState::new(engine.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Stop job loops; passes in flight finish their current chunk
    shutdown_tx.send(true).ok();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Worker loop ended abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. LIFECYCLE__WORKERS__RETENTION_INTERVAL_SECS
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("LIFECYCLE")
                .prefix_separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
