//! `/health` endpoint.

use serde::Serialize;
use signa_engine::PipelineStats;
use signa_telemetry::MetricsSnapshot;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connections with recognition turned on.
    pub active_connections: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub counters: MetricsSnapshot,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    stats: PipelineStats,
    counters: MetricsSnapshot,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        active_connections: stats.active_connections,
        queue_depth: stats.queue_depth,
        queue_capacity: stats.queue_capacity,
        counters,
    }
}
