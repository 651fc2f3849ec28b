//! Frame ingestion and dispatch: the connection registry, the frame queue and
//! the single worker that drains it through a recognition oracle.

pub mod dispatch;
pub mod pipeline;
pub mod queue;
pub mod registry;

pub use dispatch::{DispatchLoop, DispatchOutcome};
pub use pipeline::{FrameDisposition, Handled, Pipeline, PipelineConfig, PipelineStats};
pub use queue::{FrameJob, FrameQueue, PushOutcome};
pub use registry::{ConnectionRegistry, ConnectionSummary, SendOutcome};
