//! mediq-ei - Entity Intelligence microservice
//!
//! Loads configuration, opens the content database, wires the provider
//! clients into the pipeline and serves the operator commands over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediq_common::config as common_config;
use mediq_ei::commands::OperatorService;
use mediq_ei::config::EiConfig;
use mediq_ei::images::ImageProvider;
use mediq_ei::pipeline::Pipeline;
use mediq_ei::sources::{InternalRecordAdapter, MetadataProviderClient, SourceAdapter, StockImageClient};
use mediq_ei::store::{init_database_pool, ContentStore, SqliteContentStore};
use mediq_ei::AppState;

const MODULE_NAME: &str = "mediq-ei";

/// Command-line arguments for mediq-ei
#[derive(Parser, Debug)]
#[command(name = "mediq-ei")]
#[command(about = "Entity Intelligence & Validation Pipeline for mediq")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "MEDIQ_EI_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = common_config::resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let config: EiConfig = common_config::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing: RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mediq_ei={0},mediq_common={0},tower_http=info", config.bootstrap.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mediq-ei (Entity Intelligence) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Root folder and database
    let root_folder = common_config::resolve_root_folder(
        args.root_folder.as_deref(),
        config.bootstrap.root_folder.as_deref(),
    );
    common_config::ensure_root_folder(&root_folder)
        .context("Failed to initialize root folder")?;
    let db_path = config.bootstrap.database_path_in(&root_folder);
    info!("Database: {}", db_path.display());

    let pool = init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(pool).await?);
    info!("Database connection established");

    // Providers
    let mut adapters: Vec<Arc<dyn SourceAdapter>> =
        vec![Arc::new(InternalRecordAdapter::new(Arc::clone(&store)))];
    match MetadataProviderClient::new(&config.providers, &config.pipeline) {
        Ok(client) => adapters.push(Arc::new(client)),
        Err(e) => warn!(error = %e, "Metadata provider disabled"),
    }

    let mut image_providers: Vec<Arc<dyn ImageProvider>> = Vec::new();
    match StockImageClient::new(&config.providers) {
        Ok(client) => image_providers.push(Arc::new(client)),
        Err(e) => warn!(error = %e, "Stock image provider disabled"),
    }

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&store),
        adapters,
        image_providers,
        &config,
    )?);
    let service = Arc::new(OperatorService::new(store, pipeline));

    let app = mediq_ei::build_router(AppState::new(service));

    let port = args.port.unwrap_or(config.bootstrap.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
