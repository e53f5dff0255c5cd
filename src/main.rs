//! RUM Bundler
//!
//! Drains raw RUM event logs into per-session bundles:
//! - `once` (default): one run, non-zero exit on conflict or budget overrun
//! - `serve`: a run every `bundler.interval_secs` until Ctrl+C / SIGTERM;
//!   the run in progress at shutdown completes and releases its lock

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bundler::{BatchDriver, BundleError, BundlerConfig, BundlerScheduler};
use rum_storage::StorageConfig;
use telemetry::{init_tracing_from_env, metrics};

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    bundler: BundlerConfig,

    #[serde(default)]
    storage: StorageConfig,
}

/// RUM event bundler.
#[derive(Debug, Parser)]
#[command(name = "rum-bundler")]
#[command(about = "Bundles raw RUM event logs into per-session, per-hour objects")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Run a single bundling pass and exit.
    Once,

    /// Run a bundling pass on an interval until Ctrl+C / SIGTERM.
    Serve {
        /// Seconds between runs (default: `bundler.interval_secs`).
        #[arg(long, env = "BUNDLER_SERVE_INTERVAL_SECS")]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    let command = Args::parse().command.unwrap_or(Commands::Once);
    info!(version = env!("CARGO_PKG_VERSION"), ?command, "Starting RUM bundler");

    let config = load_config()?;
    info!(
        backend = ?config.storage.backend,
        logs_bucket = %config.storage.logs_bucket,
        bundles_bucket = %config.storage.bundles_bucket,
        mirror = config.storage.mirror_bundles_bucket.as_deref().unwrap_or("none"),
        "Loaded storage config"
    );

    let stores = config.storage.build().await;
    let driver = Arc::new(
        BatchDriver::new(stores, config.bundler.clone()).context("Invalid bundler configuration")?,
    );

    match command {
        Commands::Once => Ok(run_once(&driver).await),
        Commands::Serve { interval_secs } => {
            serve(driver, interval_secs.map(Duration::from_secs)).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_once(driver: &BatchDriver) -> ExitCode {
    let outcome = driver.run().await;
    metrics().log_snapshot();

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ BundleError::Conflict(_)) => {
            warn!(error = %e, "Another run is in progress");
            ExitCode::from(2)
        }
        Err(e @ BundleError::BudgetExceeded { .. }) => {
            warn!(error = %e, "Run stopped at its time budget");
            ExitCode::from(3)
        }
        Err(e) => {
            error!(error = %e, "Bundling run failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(driver: Arc<BatchDriver>, interval: Option<Duration>) {
    let mut scheduler = BundlerScheduler::new(driver);
    if let Some(interval) = interval {
        scheduler = scheduler.with_interval(interval);
    }

    let shutdown = CancellationToken::new();
    let handle = Arc::new(scheduler).start(shutdown.clone());

    shutdown_signal().await;

    info!("Shutting down, waiting for the current run to finish...");
    shutdown.cancel();
    if let Err(e) = handle.await {
        error!(error = %e, "Scheduler task failed");
    }
    metrics().log_snapshot();
    info!("Shutdown complete");
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
        // Override with environment variables, e.g. BUNDLER_STORAGE__BACKEND=s3
        .add_source(
            config::Environment::with_prefix("BUNDLER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Bucket names are commonly set flat by deploy tooling
    if let Ok(bucket) = std::env::var("BUNDLER_LOGS_BUCKET") {
        config.storage.logs_bucket = bucket;
    }
    if let Ok(bucket) = std::env::var("BUNDLER_BUNDLES_BUCKET") {
        config.storage.bundles_bucket = bucket;
    }
    if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL_S3") {
        config.storage.endpoint_url = Some(endpoint);
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
