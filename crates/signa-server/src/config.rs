//! Server configuration.

use std::time::Duration;

use signa_settings::ServerSettings;

/// Runtime configuration for the HTTP/WebSocket listener.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind; `0` asks the OS for a free one.
    pub port: u16,
    /// Outbound messages buffered per connection.
    pub max_send_queue: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_interval: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_send_queue: settings.max_send_queue,
            heartbeat_interval: settings.heartbeat_interval(),
            max_message_size: settings.max_message_size,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
