//! # signa
//!
//! Sign language detection server binary: loads settings, starts the
//! WebSocket server with the phrase oracle and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use signa_core::{OverflowPolicy, PhraseOracle, RecognitionOracle};
use signa_engine::{Pipeline, PipelineConfig};
use signa_server::{ServerConfig, ShutdownCoordinator};
use signa_settings::SignaSettings;
use signa_telemetry::LogFormat;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Sign language detection server.
#[derive(Parser, Debug)]
#[command(name = "signa", about = "Sign language detection WebSocket server")]
struct Cli {
    /// Host to bind (overrides settings and `SIGNA_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.signa/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum queued frames across all connections.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// `drop_oldest` or `reject_new`.
    #[arg(long)]
    overflow_policy: Option<OverflowPolicy>,

    /// `json` or `pretty`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// File and env settings with CLI flags on top, validated once at the end.
    fn load_settings(&self) -> Result<SignaSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(signa_settings::settings_path);
        let mut settings = signa_settings::load_unvalidated(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(capacity) = self.queue_capacity {
            settings.pipeline.queue_capacity = capacity;
        }
        if let Some(policy) = self.overflow_policy {
            settings.pipeline.overflow_policy = policy;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let telemetry = signa_telemetry::init_telemetry(&settings.logging.telemetry_config());
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        "starting signa server"
    );

    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig {
            queue_capacity: settings.pipeline.queue_capacity,
            overflow_policy: settings.pipeline.overflow_policy,
            purge_on_deactivate: settings.pipeline.purge_on_deactivate,
        },
        telemetry.metrics(),
    ));
    let oracle: Arc<dyn RecognitionOracle> = match settings.pipeline.stub_latency_ms {
        0 => Arc::new(PhraseOracle::new()),
        ms => Arc::new(PhraseOracle::with_latency(Duration::from_millis(ms))),
    };

    let shutdown = ShutdownCoordinator::new();
    let handle = signa_server::start(
        ServerConfig::from(&settings.server),
        pipeline,
        oracle,
        shutdown.token(),
    )
    .await
    .context("Failed to start server")?;

    tracing::info!(port = handle.port, "signa server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    if !shutdown
        .graceful_shutdown(handle.into_handles(), Some(SHUTDOWN_TIMEOUT))
        .await
    {
        tracing::warn!("forced exit after shutdown timeout");
    }
    Ok(())
}
