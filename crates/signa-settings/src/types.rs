use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use signa_core::OverflowPolicy;
use signa_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

use crate::errors::{Result, SettingsError};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3001;

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignaSettings {
    pub server: ServerSettings,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

impl SignaSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "pipeline.queueCapacity must be at least 1".into(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if signa_telemetry::parse_level(&self.logging.level).is_none() {
            return Err(SettingsError::InvalidValue(format!(
                "logging.level `{}` is not a log level",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Network and per-connection transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Outbound messages buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// WebSocket ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_send_queue: 256,
            heartbeat_interval_ms: 30_000,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Frame queue and dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Maximum number of queued frames across all connections.
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Drop a connection's queued frames as soon as it stops or disconnects.
    pub purge_on_deactivate: bool,
    /// Artificial latency of the stub recognizer, in milliseconds.
    pub stub_latency_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            purge_on_deactivate: true,
            stub_latency_ms: 0,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `{"signa_engine": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            module_levels: BTreeMap::new(),
        }
    }
}

impl LoggingSettings {
    /// Convert to a telemetry config; unparseable levels fall back to INFO / are skipped.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let module_levels = self
            .module_levels
            .iter()
            .filter_map(|(module, level)| {
                signa_telemetry::parse_level(level).map(|l| (module.clone(), l))
            })
            .collect();
        TelemetryConfig {
            log_level: signa_telemetry::parse_level(&self.level).unwrap_or(Level::INFO),
            module_levels,
            format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = SignaSettings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.pipeline.queue_capacity, 256);
        assert_eq!(settings.pipeline.overflow_policy, OverflowPolicy::DropOldest);
        assert!(settings.pipeline.purge_on_deactivate);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn camel_case_wire_names() {
        let json = serde_json::to_value(SignaSettings::default()).unwrap();
        assert_eq!(json["server"]["maxSendQueue"], 256);
        assert_eq!(json["pipeline"]["overflowPolicy"], "drop_oldest");
        assert_eq!(json["pipeline"]["purgeOnDeactivate"], true);
        assert_eq!(json["logging"]["moduleLevels"], serde_json::json!({}));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let settings: SignaSettings =
            serde_json::from_str(r#"{"pipeline":{"overflowPolicy":"reject_new"}}"#).unwrap();
        assert_eq!(settings.pipeline.overflow_policy, OverflowPolicy::RejectNew);
        assert_eq!(settings.pipeline.queue_capacity, 256);
        assert_eq!(settings.server.port, 3001);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut settings = SignaSettings::default();
        settings.pipeline.queue_capacity = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_bad_level() {
        let mut settings = SignaSettings::default();
        settings.logging.level = "chatty".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn telemetry_config_conversion() {
        let mut logging = LoggingSettings::default();
        logging.level = "debug".into();
        let _ = logging.module_levels.insert("signa_engine".into(), "trace".into());
        let _ = logging.module_levels.insert("hyper".into(), "nonsense".into());

        let config = logging.telemetry_config();
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.module_levels, vec![("signa_engine".to_string(), Level::TRACE)]);
    }
}
