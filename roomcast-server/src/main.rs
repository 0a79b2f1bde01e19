//! Roomcast server - Main entry point
//!
//! Shared listening-rooms backend. Opens the SQLite key/value store,
//! replays persisted timers, ensures the hall room, then serves the
//! HTTP/SSE API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomcast_server::api::{self, AppState};
use roomcast_server::bootstrap;
use roomcast_server::config::Config;
use roomcast_server::provider::HttpTrackProvider;
use roomcast_server::store::{KvStore, SqliteStore};

/// Command-line arguments for roomcast-server
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Shared listening-rooms backend")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "ROOMCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "ROOMCAST_PORT")]
    port: Option<u16>,

    /// sqlx database URL (overrides the config file)
    #[arg(short, long, env = "ROOMCAST_DATABASE_URL")]
    database_url: Option<String>,

    /// Track provider base URL (overrides the config file)
    #[arg(long, env = "ROOMCAST_PROVIDER_URL")]
    provider_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    if let Some(provider_url) = args.provider_url {
        config.provider_base_url = provider_url;
    }

    info!("Starting Roomcast server on port {}", config.port);
    info!("Database: {}", config.database_url);

    let store: Arc<dyn KvStore> = Arc::new(
        SqliteStore::open(&config.database_url)
            .await
            .context("Failed to open key/value store")?,
    );
    let provider = Arc::new(HttpTrackProvider::new(&config.provider_base_url));

    let app = bootstrap::build(
        store,
        provider,
        config.routine_periods(),
        config.destroy_delay_seconds,
    );
    bootstrap::start(&app)
        .await
        .context("Failed to start services")?;

    let router = api::create_router(AppState {
        rooms: app.rooms.clone(),
        playback: Arc::clone(&app.playback),
        lifecycle: Arc::clone(&app.lifecycle),
        runtime: Arc::clone(&app.runtime),
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
