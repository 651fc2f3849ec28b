pub mod errors;
pub mod ids;
pub mod messages;
pub mod oracle;
pub mod policy;

pub mod mock;

pub use errors::{DecodeError, OracleError};
pub use ids::ConnectionId;
pub use messages::{Command, DetectionStatus, EncodedFrame, FrameMessage, Inbound, ServerMessage};
pub use mock::{MockOracle, MockReply};
pub use oracle::{PhraseOracle, RecognitionOracle};
pub use policy::OverflowPolicy;
