use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use signa_core::RecognitionOracle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Pipeline;

/// How one dequeued job was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A detection was sent to the owning connection.
    Delivered { frame_id: u64 },
    /// Not delivered: the connection stopped or went away while the oracle
    /// was running, or its outbound buffer was full.
    Stale { frame_id: u64 },
    /// The connection was not eligible at dequeue time; the oracle was not called.
    Skipped { frame_id: u64 },
    OracleFailed { frame_id: u64, kind: &'static str },
}

/// The single worker that drains the frame queue through the oracle.
///
/// Only one job is ever in flight, so at most one oracle call runs at a time
/// no matter how many connections are producing frames.
#[derive(Clone)]
pub struct DispatchLoop {
    pipeline: Arc<Pipeline>,
    oracle: Arc<dyn RecognitionOracle>,
}

impl DispatchLoop {
    pub fn new(pipeline: Arc<Pipeline>, oracle: Arc<dyn RecognitionOracle>) -> Self {
        Self { pipeline, oracle }
    }

    /// Settle the head job. Returns `None` when the queue is empty.
    pub async fn process_next(&self) -> Option<DispatchOutcome> {
        let (job, eligible) = self.pipeline.take_next()?;
        let metrics = self.pipeline.metrics();
        let frame_id = job.frame_id;

        if !eligible {
            metrics.job_skipped();
            tracing::debug!(conn_id = %job.connection, frame_id, "skipping frame for ineligible connection");
            return Some(DispatchOutcome::Skipped { frame_id });
        }

        let started = Instant::now();
        let result = AssertUnwindSafe(self.oracle.detect(&job.payload))
            .catch_unwind()
            .await;
        metrics.observe_oracle_latency(started.elapsed());

        let text = match result {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                metrics.oracle_failed();
                tracing::warn!(
                    conn_id = %job.connection,
                    frame_id,
                    error = %error,
                    kind = error.error_kind(),
                    "recognition failed, dropping frame"
                );
                return Some(DispatchOutcome::OracleFailed {
                    frame_id,
                    kind: error.error_kind(),
                });
            }
            Err(_) => {
                metrics.oracle_failed();
                tracing::error!(conn_id = %job.connection, frame_id, "recognition panicked, dropping frame");
                return Some(DispatchOutcome::OracleFailed {
                    frame_id,
                    kind: "panic",
                });
            }
        };

        if self.pipeline.deliver(&job, text) {
            metrics.detection_delivered();
            tracing::trace!(conn_id = %job.connection, frame_id, "detection delivered");
            Some(DispatchOutcome::Delivered { frame_id })
        } else {
            metrics.detection_stale();
            tracing::debug!(conn_id = %job.connection, frame_id, "discarding stale detection");
            Some(DispatchOutcome::Stale { frame_id })
        }
    }

    /// Drain the queue, then wait for more work, until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(oracle = self.oracle.name(), "dispatch loop started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.process_next() => {
                    if outcome.is_some() {
                        continue;
                    }
                }
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.pipeline.work_available() => {}
            }
        }
        tracing::info!(queue_depth = self.pipeline.stats().queue_depth, "dispatch loop stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
