//! crowdq server - Main entry point
//!
//! Loads configuration, starts the acquisition and playback workers, and
//! serves the HTTP control API until Ctrl+C / SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crowdq_common::config::Config;
use crowdq_server::{api, App};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for crowdq-server
#[derive(Parser, Debug)]
#[command(name = "crowdq-server")]
#[command(about = "Shared playback queue with crowd voting")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml", env = "CROWDQ_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CROWDQ_PORT")]
    port: Option<u16>,

    /// Media directory (overrides the config file)
    #[arg(short, long, env = "CROWDQ_MUSIC_DIR")]
    music_dir: Option<PathBuf>,
}

impl Args {
    /// Config file layered with command-line / environment overrides
    fn resolve_config(&self) -> Result<Config> {
        let mut config = if self.config.exists() {
            Config::load(&self.config)
                .with_context(|| format!("Failed to load {}", self.config.display()))?
        } else if self.music_dir.is_some() {
            info!(
                "No config file at {}, using defaults",
                self.config.display()
            );
            Config::default()
        } else {
            anyhow::bail!(
                "Config file {} not found and --music-dir not given",
                self.config.display()
            );
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.music_dir {
            config.music_dir = dir.clone();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crowdq_server=debug,crowdq_common=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.resolve_config()?;

    info!("Starting crowdq server on port {}", config.port);
    info!("Music directory: {}", config.music_dir.display());
    info!("Mode: {:?}", config.mode);

    let app = App::from_config(&config)
        .await
        .context("Failed to initialize application")?;
    let workers = app.start();

    let router = api::create_router(app.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app.shutdown();
    workers.join().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
            info!("Received SIGTERM, shutting down");
        },
    }
}
