use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use signa_core::messages::{self, ServerMessage};
use signa_core::{
    Command, ConnectionId, DecodeError, DetectionStatus, EncodedFrame, FrameMessage, Inbound,
    OverflowPolicy,
};
use signa_telemetry::PipelineMetrics;
use tokio::sync::{mpsc, Notify};

use crate::queue::{FrameJob, FrameQueue, PushOutcome};
use crate::registry::{ConnectionRegistry, SendOutcome};

/// Queue sizing and purge behavior.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Drop a connection's queued frames on stop or disconnect.
    pub purge_on_deactivate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            purge_on_deactivate: true,
        }
    }
}

/// What became of a submitted frame.
#[derive(Debug, PartialEq)]
pub enum FrameDisposition {
    Queued,
    /// Queued; the oldest job in the queue was dropped to make room.
    Evicted(FrameJob),
    /// The queue was full and refused the frame.
    Rejected,
    /// The connection is not eligible; the frame was not queued.
    Inactive,
}

/// Result of handling one inbound message.
#[derive(Debug, PartialEq)]
pub enum Handled {
    Frame(FrameDisposition),
    /// A recognized command; `None` when the connection is no longer registered.
    Command(Option<DetectionStatus>),
    /// Unknown type or action.
    Ignored,
    Malformed,
}

/// Point-in-time view of the shared state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub connections: usize,
    pub active_connections: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

struct PipelineState {
    registry: ConnectionRegistry,
    queue: FrameQueue,
}

/// Connection registry and frame queue behind one lock.
///
/// Every method takes the lock at most once and never holds it across an
/// `.await`. The [`DispatchLoop`](crate::DispatchLoop) is woken through
/// [`work_available`](Self::work_available) whenever a job is queued.
pub struct Pipeline {
    state: Mutex<PipelineState>,
    wake: Notify,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, metrics: Arc<PipelineMetrics>) -> Self {
        let state = PipelineState {
            registry: ConnectionRegistry::new(),
            queue: FrameQueue::new(config.queue_capacity, config.overflow_policy),
        };
        Self {
            state: Mutex::new(state),
            wake: Notify::new(),
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Register a connection (inactive) and greet it.
    pub fn connect(&self, id: ConnectionId, outbound: mpsc::Sender<Arc<String>>) {
        let welcome = encode(&ServerMessage::welcome());
        let mut state = self.state.lock();
        state.registry.register(id.clone(), outbound);
        if let Some(welcome) = welcome {
            let _ = self.send(&mut state.registry, &id, welcome);
        }
        tracing::info!(conn_id = %id, connections = state.registry.len(), "connection registered");
    }

    /// Forget a connection. Returns `false` if it was not registered.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(summary) = state.registry.unregister(id) else {
            return false;
        };
        let purged = if self.config.purge_on_deactivate {
            state.queue.purge(id)
        } else {
            0
        };
        tracing::info!(
            conn_id = %id,
            purged,
            age_ms = summary.age.as_millis() as u64,
            dropped_messages = summary.dropped_messages,
            connections = state.registry.len(),
            "connection unregistered"
        );
        true
    }

    fn send(
        &self,
        registry: &mut ConnectionRegistry,
        id: &ConnectionId,
        message: Arc<String>,
    ) -> SendOutcome {
        let outcome = registry.send(id, message);
        if outcome == SendOutcome::Full {
            self.metrics.outbound_dropped();
        }
        outcome
    }

    /// Apply a recognition toggle and acknowledge it.
    ///
    /// The acknowledgement is queued on the connection's writer while the
    /// lock is held, so it is ordered after every detection delivered before
    /// the toggle took effect.
    pub fn handle_command(&self, id: &ConnectionId, command: &Command) -> Option<DetectionStatus> {
        let status = match command {
            Command::StartDetection => DetectionStatus::DetectionStarted,
            Command::StopDetection => DetectionStatus::DetectionStopped,
            Command::Unknown(action) => {
                tracing::debug!(conn_id = %id, action = %action, "ignoring unknown command");
                return None;
            }
        };
        let ack = encode(&ServerMessage::status(status));

        let mut state = self.state.lock();
        let known = match status {
            DetectionStatus::DetectionStarted => state.registry.activate(id),
            DetectionStatus::DetectionStopped => state.registry.deactivate(id),
        };
        if !known {
            tracing::debug!(conn_id = %id, "command for unregistered connection");
            return None;
        }
        let mut purged = 0;
        if status == DetectionStatus::DetectionStopped && self.config.purge_on_deactivate {
            purged = state.queue.purge(id);
        }
        if let Some(ack) = ack {
            let _ = self.send(&mut state.registry, id, ack);
        }
        drop(state);

        tracing::info!(conn_id = %id, status = ?status, purged, "detection toggled");
        Some(status)
    }

    /// Queue a frame if its connection is eligible, then wake the worker.
    pub fn submit_frame(&self, id: &ConnectionId, frame: FrameMessage) -> FrameDisposition {
        self.metrics.frame_received();
        let frame_id = frame.frame_id;

        let mut state = self.state.lock();
        if !state.registry.is_eligible(id) {
            drop(state);
            return self.reject_inactive(id, frame_id);
        }
        let job = FrameJob {
            connection: id.clone(),
            payload: frame.data,
            frame_id,
        };
        let outcome = state.queue.push(job);
        let queue_depth = state.queue.len();
        drop(state);

        let disposition = match outcome {
            PushOutcome::Queued => FrameDisposition::Queued,
            PushOutcome::Evicted(oldest) => {
                self.metrics.frame_dropped_overflow();
                tracing::warn!(
                    conn_id = %oldest.connection,
                    frame_id = oldest.frame_id,
                    queue_depth,
                    "frame queue full, dropped oldest frame"
                );
                FrameDisposition::Evicted(oldest)
            }
            PushOutcome::Rejected(_) => {
                self.metrics.frame_dropped_overflow();
                tracing::warn!(conn_id = %id, frame_id, queue_depth, "frame queue full, rejected frame");
                return FrameDisposition::Rejected;
            }
        };

        self.metrics.frame_enqueued();
        tracing::debug!(conn_id = %id, frame_id, queue_depth, "frame queued");
        self.wake.notify_one();
        disposition
    }

    fn reject_inactive(&self, id: &ConnectionId, frame_id: u64) -> FrameDisposition {
        self.metrics.frame_rejected_inactive();
        tracing::trace!(conn_id = %id, frame_id, "frame from inactive connection dropped");
        FrameDisposition::Inactive
    }

    /// Decode and apply a text message from a connection.
    pub fn handle_text(&self, id: &ConnectionId, raw: &str) -> Handled {
        self.apply(id, messages::decode(raw))
    }

    /// Decode and apply a binary message from a connection.
    pub fn handle_binary(&self, id: &ConnectionId, raw: &[u8]) -> Handled {
        self.apply(id, messages::decode_binary(raw))
    }

    fn apply(&self, id: &ConnectionId, decoded: Result<Inbound, DecodeError>) -> Handled {
        match decoded {
            Ok(Inbound::Frame(encoded)) => self.apply_frame(id, encoded),
            Ok(Inbound::Command(Command::Unknown(action))) => {
                tracing::debug!(conn_id = %id, action = %action, "ignoring unknown command");
                Handled::Ignored
            }
            Ok(Inbound::Command(command)) => Handled::Command(self.handle_command(id, &command)),
            Ok(Inbound::Unknown(kind)) => {
                tracing::debug!(conn_id = %id, kind = %kind, "ignoring unknown message type");
                Handled::Ignored
            }
            Err(error) => {
                self.metrics.malformed_message();
                tracing::warn!(conn_id = %id, error = %error, "dropping malformed message");
                Handled::Malformed
            }
        }
    }

    /// Frames from connections that are not detecting are dropped before
    /// their image data is decoded.
    fn apply_frame(&self, id: &ConnectionId, encoded: EncodedFrame) -> Handled {
        if !self.is_eligible(id) {
            self.metrics.frame_received();
            return Handled::Frame(self.reject_inactive(id, encoded.frame_id));
        }
        let frame_id = encoded.frame_id;
        match encoded.decode() {
            Ok(frame) => Handled::Frame(self.submit_frame(id, frame)),
            Err(error) => {
                self.metrics.frame_received();
                self.metrics.malformed_message();
                tracing::warn!(conn_id = %id, frame_id, error = %error, "dropping undecodable frame");
                Handled::Malformed
            }
        }
    }

    /// Pop the head job and report whether its connection is still eligible.
    ///
    /// Both happen under one lock acquisition.
    pub fn take_next(&self) -> Option<(FrameJob, bool)> {
        let mut state = self.state.lock();
        let job = state.queue.pop()?;
        let eligible = state.registry.is_eligible(&job.connection);
        Some((job, eligible))
    }

    /// Send a recognition result if the job's connection is still eligible.
    pub fn deliver(&self, job: &FrameJob, text: String) -> bool {
        let Some(message) = encode(&ServerMessage::detection(text, job.frame_id)) else {
            return false;
        };
        let mut state = self.state.lock();
        if !state.registry.is_eligible(&job.connection) {
            return false;
        }
        self.send(&mut state.registry, &job.connection, message) == SendOutcome::Sent
    }

    /// Resolves once a job has been queued since the last wake-up.
    ///
    /// A wake-up issued while nobody is waiting is kept for the next call.
    pub async fn work_available(&self) {
        self.wake.notified().await;
    }

    pub fn is_eligible(&self, id: &ConnectionId) -> bool {
        self.state.lock().registry.is_eligible(id)
    }

    pub fn stats(&self) -> PipelineStats {
        let state = self.state.lock();
        PipelineStats {
            connections: state.registry.len(),
            active_connections: state.registry.active_count(),
            queue_depth: state.queue.len(),
            queue_capacity: state.queue.capacity(),
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Arc<String>> {
    match message.to_json() {
        Ok(json) => Some(Arc::new(json)),
        Err(error) => {
            tracing::error!(error = %error, "failed to serialize server message");
            None
        }
    }
}
