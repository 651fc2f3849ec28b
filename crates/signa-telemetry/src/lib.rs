mod metrics;

pub use metrics::{HistogramSummary, MetricsSnapshot, PipelineMetrics};

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for stdout logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "signa_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Filter directive string, e.g. `info,signa_engine=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Returned by [`init_telemetry`]; owns the process-wide pipeline counters.
pub struct TelemetryGuard {
    metrics: std::sync::Arc<PipelineMetrics>,
    installed: bool,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> std::sync::Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Whether this call installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
///
/// A second call leaves the existing global subscriber in place.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryGuard {
    let directives = config.filter_directives();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok();

    TelemetryGuard {
        metrics: std::sync::Arc::new(PipelineMetrics::new()),
        installed,
    }
}

/// Parse a level name, accepting any case.
pub fn parse_level(s: &str) -> Option<Level> {
    Level::from_str(s.trim()).ok()
}
