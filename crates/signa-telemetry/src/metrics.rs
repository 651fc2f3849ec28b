use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Latency observations kept for percentile computation.
const LATENCY_WINDOW: usize = 1024;

/// In-memory counter. Monotonically increasing.
#[derive(Default)]
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Sliding-window histogram over the most recent observations.
struct Histogram {
    observations: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl Histogram {
    fn new(capacity: usize) -> Self {
        Self {
            observations: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn observe(&self, value: f64) {
        let mut obs = self.observations.lock();
        if obs.len() == self.capacity {
            obs.pop_front();
        }
        obs.push_back(value);
    }

    fn summary(&self) -> HistogramSummary {
        let mut sorted: Vec<f64> = self.observations.lock().iter().copied().collect();
        if sorted.is_empty() {
            return HistogramSummary::default();
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];
        HistogramSummary {
            count: count as u64,
            sum,
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
        }
    }
}

/// Summary statistics from a histogram.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Counters for the frame ingestion and dispatch pipeline.
pub struct PipelineMetrics {
    frames_received: Counter,
    frames_enqueued: Counter,
    frames_rejected_inactive: Counter,
    frames_dropped_overflow: Counter,
    jobs_skipped: Counter,
    detections_delivered: Counter,
    detections_stale: Counter,
    oracle_failures: Counter,
    malformed_messages: Counter,
    outbound_dropped: Counter,
    oracle_latency_ms: Histogram,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: Counter::default(),
            frames_enqueued: Counter::default(),
            frames_rejected_inactive: Counter::default(),
            frames_dropped_overflow: Counter::default(),
            jobs_skipped: Counter::default(),
            detections_delivered: Counter::default(),
            detections_stale: Counter::default(),
            oracle_failures: Counter::default(),
            malformed_messages: Counter::default(),
            outbound_dropped: Counter::default(),
            oracle_latency_ms: Histogram::new(LATENCY_WINDOW),
        }
    }

    pub fn frame_received(&self) {
        self.frames_received.increment();
    }

    pub fn frame_enqueued(&self) {
        self.frames_enqueued.increment();
    }

    pub fn frame_rejected_inactive(&self) {
        self.frames_rejected_inactive.increment();
    }

    pub fn frame_dropped_overflow(&self) {
        self.frames_dropped_overflow.increment();
    }

    pub fn job_skipped(&self) {
        self.jobs_skipped.increment();
    }

    pub fn detection_delivered(&self) {
        self.detections_delivered.increment();
    }

    pub fn detection_stale(&self) {
        self.detections_stale.increment();
    }

    pub fn oracle_failed(&self) {
        self.oracle_failures.increment();
    }

    pub fn malformed_message(&self) {
        self.malformed_messages.increment();
    }

    /// A server message was dropped because a client's outbound buffer was full.
    pub fn outbound_dropped(&self) {
        self.outbound_dropped.increment();
    }

    pub fn observe_oracle_latency(&self, elapsed: Duration) {
        self.oracle_latency_ms.observe(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.get(),
            frames_enqueued: self.frames_enqueued.get(),
            frames_rejected_inactive: self.frames_rejected_inactive.get(),
            frames_dropped_overflow: self.frames_dropped_overflow.get(),
            jobs_skipped: self.jobs_skipped.get(),
            detections_delivered: self.detections_delivered.get(),
            detections_stale: self.detections_stale.get(),
            oracle_failures: self.oracle_failures.get(),
            malformed_messages: self.malformed_messages.get(),
            outbound_dropped: self.outbound_dropped.get(),
            oracle_latency_ms: self.oracle_latency_ms.summary(),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_enqueued: u64,
    pub frames_rejected_inactive: u64,
    pub frames_dropped_overflow: u64,
    pub jobs_skipped: u64,
    pub detections_delivered: u64,
    pub detections_stale: u64,
    pub oracle_failures: u64,
    pub malformed_messages: u64,
    pub outbound_dropped: u64,
    pub oracle_latency_ms: HistogramSummary,
}
