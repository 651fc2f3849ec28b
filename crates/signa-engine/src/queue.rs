use std::collections::VecDeque;

use bytes::Bytes;
use signa_core::{ConnectionId, OverflowPolicy};

/// One frame waiting for recognition.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameJob {
    /// Owning connection. Used only for lookup; the registry owns the connection.
    pub connection: ConnectionId,
    pub payload: Bytes,
    pub frame_id: u64,
}

/// What happened to a job handed to [`FrameQueue::push`].
#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    Queued,
    /// The job was queued after evicting the oldest one.
    Evicted(FrameJob),
    /// The queue was full and the new job was refused.
    Rejected(FrameJob),
}

/// Bounded global FIFO of pending frames.
///
/// Ordering is across all connections: there is no per-connection fairness.
pub struct FrameQueue {
    jobs: VecDeque<FrameJob>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl FrameQueue {
    /// Create a queue; a capacity of zero is treated as one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            jobs: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            policy,
        }
    }

    pub fn push(&mut self, job: FrameJob) -> PushOutcome {
        if self.jobs.len() < self.capacity {
            self.jobs.push_back(job);
            return PushOutcome::Queued;
        }
        match self.policy {
            OverflowPolicy::RejectNew => PushOutcome::Rejected(job),
            OverflowPolicy::DropOldest => match self.jobs.pop_front() {
                Some(oldest) => {
                    self.jobs.push_back(job);
                    PushOutcome::Evicted(oldest)
                }
                None => {
                    self.jobs.push_back(job);
                    PushOutcome::Queued
                }
            },
        }
    }

    pub fn pop(&mut self) -> Option<FrameJob> {
        self.jobs.pop_front()
    }

    /// Remove every queued job owned by `connection`, keeping the others in order.
    pub fn purge(&mut self, connection: &ConnectionId) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| &job.connection != connection);
        before - self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
