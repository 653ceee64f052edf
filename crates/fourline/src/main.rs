//! fourline server
//!
//! Serves connect-four sessions over WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use fourline::ConfigLoader;
use fourline::prelude::*;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered finished games / events between the coordinator and the sinks.
const SINK_CAPACITY: usize = 256;

/// fourline - real-time connect-four session server
#[derive(Parser, Debug)]
#[command(name = "fourline-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Postgres connection string for finished games
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting fourline-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(args.config.as_deref(), args.listen)
        .database_url(args.database_url)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;

    let mut builder = FourlineServer::builder()
        .config(config.clone())
        .recorder(recorder(&config).await?);
    if config.event_log.enabled {
        builder = builder.publisher(spawn_publisher(LogPublisher, SINK_CAPACITY));
    }

    let server = builder.build().await?;
    tracing::info!("Listening on {}", server.local_addr()?);

    server.run_until(shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn recorder(config: &ServerConfig) -> anyhow::Result<RecorderHandle> {
    match &config.database.url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let recorder = fourline::PgRecorder::connect(url).await.map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
            tracing::info!("Database connection established");
            Ok(spawn_recorder(recorder, SINK_CAPACITY))
        }
        None => Ok(spawn_recorder(LogRecorder, SINK_CAPACITY)),
    }
}

#[cfg(not(feature = "postgres"))]
async fn recorder(config: &ServerConfig) -> anyhow::Result<RecorderHandle> {
    if config.database.url.is_some() {
        tracing::warn!("database.url is set but this build has no postgres support; logging finished games only");
    }
    Ok(spawn_recorder(LogRecorder, SINK_CAPACITY))
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Completes on SIGTERM or SIGINT.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received ctrl-c, initiating graceful shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
