use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::OracleError;
use crate::oracle::RecognitionOracle;

/// Pre-programmed replies for deterministic testing without a model.
pub enum MockReply {
    /// Answer with this text.
    Text(String),
    /// Answer with the frame bytes interpreted as UTF-8.
    Echo,
    /// Fail the call.
    Error(OracleError),
    /// Wait a duration, then resolve the inner reply.
    Delay(Duration, Box<MockReply>),
    /// Wait until the notify fires, then resolve the inner reply.
    Gate(Arc<Notify>, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }

    pub fn gated(gate: Arc<Notify>, inner: MockReply) -> Self {
        Self::Gate(gate, Box::new(inner))
    }
}

/// Oracle that plays back scripted replies in order, then echoes.
///
/// Records every frame it was handed and the peak number of concurrent calls.
pub struct MockOracle {
    replies: Mutex<VecDeque<MockReply>>,
    frames: Mutex<Vec<Vec<u8>>>,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockOracle {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            frames: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// An oracle that echoes every frame.
    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Frames received so far, in call order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecognitionOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn detect(&self, frame: &[u8]) -> Result<String, OracleError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.frames.lock().push(frame.to_vec());
        let reply = self.replies.lock().pop_front().unwrap_or(MockReply::Echo);
        resolve_reply(reply, frame).await
    }
}

/// Resolve a reply, unrolling nested waits iteratively.
async fn resolve_reply(reply: MockReply, frame: &[u8]) -> Result<String, OracleError> {
    let mut current = reply;
    loop {
        match current {
            MockReply::Text(text) => return Ok(text),
            MockReply::Echo => return Ok(String::from_utf8_lossy(frame).into_owned()),
            MockReply::Error(e) => return Err(e),
            MockReply::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockReply::Gate(gate, inner) => {
                gate.notified().await;
                current = *inner;
            }
        }
    }
}
