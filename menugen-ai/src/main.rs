//! menugen-ai - Menu Ingest Microservice
//!
//! Turns a photo of a restaurant menu into a structured menu: sections and
//! dishes extracted by a vision model, then each dish enriched with a short
//! description and a generated photo. Integrates with clients via HTTP REST
//! plus SSE.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use menugen_common::config::{self as common_config, TomlConfig, CONFIG_FILE_NAME};
use menugen_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use menugen_ai::AppState;

const ROOT_FOLDER_ENV: &str = "MENUGEN_ROOT_FOLDER";
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for menugen-ai
#[derive(Parser, Debug)]
#[command(name = "menugen-ai")]
#[command(about = "Menu photo ingest and enrichment microservice")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the TOML value)
    #[arg(short, long, env = "MENUGEN_PORT")]
    port: Option<u16>,

    /// Folder holding the database
    #[arg(short, long, env = "MENUGEN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file (default: <root>/menugen.toml)
    #[arg(short, long, env = "MENUGEN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Locate and load configuration (missing file → defaults)
    let config_path = args.config.clone().unwrap_or_else(|| {
        common_config::resolve_root_folder(
            args.root_folder.as_deref(),
            ROOT_FOLDER_ENV,
            &TomlConfig::default(),
        )
        .join(CONFIG_FILE_NAME)
    });
    let mut config = common_config::load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Step 2: Initialize tracing (RUST_LOG wins over the TOML level)
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting menugen-ai (Menu Ingest) microservice");
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Config file: {}", config_path.display());

    config
        .pipeline
        .validate()
        .context("Invalid pipeline configuration")?;

    // Step 3: Resolve root folder and open the database
    let root_folder =
        common_config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    let db_path = common_config::ensure_root_folder(&root_folder)
        .context("Failed to initialize root folder")?;
    info!("Database: {}", db_path.display());

    let db_pool = menugen_ai::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 4: External services (missing keys only warn)
    let services = menugen_ai::config::build_ai_services(&config)?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(db_pool, event_bus, services, &config.pipeline);
    let supervisor = state.supervisor.clone();
    info!(
        enrichment_width = config.pipeline.enrichment_width,
        max_upload_bytes = config.pipeline.max_upload_bytes,
        "Pipeline configured"
    );

    let app = menugen_ai::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // In-flight menus finish enrichment as aborted and still reach COMPLETE
    supervisor.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
