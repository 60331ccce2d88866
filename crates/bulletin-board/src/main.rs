//! # bulletin-board
//!
//! Bulletin board server binary: loads settings, starts logging and metrics,
//! and serves the WebSocket broadcast endpoint until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bulletin_core::{LogFormat, init_subscriber};
use bulletin_server::config::ServerConfig;
use bulletin_server::metrics::install_recorder;
use bulletin_server::server::BulletinServer;
use bulletin_settings::BulletinSettings;
use clap::Parser;

/// Extra time on top of the drain grace for the listener and sessions to stop.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Real-time bulletin board server.
#[derive(Parser, Debug)]
#[command(name = "bulletin-board", about = "Real-time bulletin board server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.bulletin/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(bulletin_settings::settings_path)
    }

    /// Server configuration from settings with CLI overrides applied.
    fn server_config(&self, settings: &BulletinSettings) -> ServerConfig {
        let mut config = ServerConfig::from(&settings.server);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }

    fn log_level<'a>(&'a self, settings: &'a BulletinSettings) -> &'a str {
        self.log_level.as_deref().unwrap_or(&settings.logging.level)
    }
}

fn log_format(settings: &BulletinSettings) -> LogFormat {
    if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let settings = bulletin_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    init_subscriber(args.log_level(&settings), log_format(&settings));

    let metrics = install_recorder().context("Failed to install metrics recorder")?;
    let config = args.server_config(&settings);
    let server = BulletinServer::new(config).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        max_connections = server.config().max_connections,
        queue_capacity = server.config().queue_capacity,
        "bulletin board listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let timeout = server.config().drain_grace() + SHUTDOWN_MARGIN;
    let drained = server.shutdown().drain(handle, timeout).await;

    tracing::info!(
        drained,
        last_sequence = server.hub().last_sequence(),
        "Shutdown complete"
    );
    Ok(())
}
