//! ideahub-import - Bulk spreadsheet import service
//!
//! Accepts CSV/XLS/XLSX uploads, turns each row into an idea and reports
//! per-job progress for polling clients.

use anyhow::{Context, Result};
use clap::Parser;
use ideahub_common::config::{load_toml_config, resolve_data_folder, ConfigFileResolver, DataFolder};
use ideahub_import::config::{ServiceConfig, DEFAULT_PORT};
use ideahub_import::db::{init_database_pool, SqliteIdeaStore};
use ideahub_import::services::{ImportCoordinator, JobRegistry, RecordSink, RetryingSink};
use ideahub_import::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bootstrap TOML file (otherwise IDEAHUB_IMPORT_CONFIG or ./ideahub-import.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "IDEAHUB_IMPORT_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ConfigFileResolver::new("import").resolve(args.config.as_deref());
    let config: ServiceConfig = load_toml_config(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    info!("Starting ideahub-import v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    let db_path = match args.database.or(config.database_path.clone()) {
        Some(path) => path,
        None => {
            let data_folder = DataFolder::new(resolve_data_folder());
            data_folder
                .ensure_directory_exists()
                .context("Failed to initialize data folder")?;
            data_folder.database_path()
        }
    };
    info!("Database: {}", db_path.display());

    let pool = init_database_pool(&db_path).await?;
    info!("Database connection established");

    let settings = &config.import;
    let sink: Arc<dyn RecordSink> = Arc::new(RetryingSink::new(
        SqliteIdeaStore::new(pool),
        settings.retry.policy(),
    ));
    let registry = JobRegistry::new(settings.retention());
    let coordinator = ImportCoordinator::new(registry.clone(), sink, settings);
    info!(
        workers = coordinator.workers(),
        retention_secs = settings.retention_secs,
        "Import engine ready"
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        registry
            .clone()
            .run_sweeper(settings.sweep_interval(), shutdown.clone()),
    );

    let app = build_router(AppState::new(coordinator), settings.max_upload_bytes);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}
