/// Failure to turn an inbound WebSocket message into an [`Inbound`](crate::messages::Inbound).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string `type` field")]
    MissingType,
    #[error("invalid {kind} message: {reason}")]
    InvalidFields { kind: &'static str, reason: String },
    #[error("frame carries no image data")]
    EmptyFrame,
    #[error("frame data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("binary message is not valid UTF-8")]
    NotUtf8,
}

/// Errors a recognition oracle can return for a single frame.
#[derive(Clone, Debug, thiserror::Error)]
pub enum OracleError {
    #[error("frame rejected: {0}")]
    InvalidFrame(String),
    #[error("recognition failed: {0}")]
    Failed(String),
    #[error("oracle unavailable")]
    Unavailable,
}

impl OracleError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "invalid_frame",
            Self::Failed(_) => "failed",
            Self::Unavailable => "unavailable",
        }
    }
}
