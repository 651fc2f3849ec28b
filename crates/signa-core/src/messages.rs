//! Wire messages exchanged over the detection WebSocket.
//!
//! Inbound messages are classified in two steps: the envelope is parsed as a
//! JSON object and its `type` inspected, then the type-specific fields are
//! decoded. Unrecognized types and actions are not errors; they decode to
//! [`Inbound::Unknown`] / [`Command::Unknown`] so the caller can drop them
//! quietly while still logging genuinely malformed input.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeError;

/// Greeting sent once on every new connection.
pub const WELCOME_MESSAGE: &str = "Connected to sign language detection server";

/// A decoded client → server message.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A frame whose image data has not been decoded yet.
    Frame(EncodedFrame),
    Command(Command),
    /// A well-formed message whose `type` this server does not handle.
    Unknown(String),
}

/// A frame message as received, with `data` still base64 or a data URL.
///
/// Decoding is deferred so frames from connections that are not detecting
/// are dropped without touching the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: String,
    pub frame_id: u64,
}

impl EncodedFrame {
    pub fn decode(self) -> Result<FrameMessage, DecodeError> {
        Ok(FrameMessage {
            data: decode_frame_data(&self.data)?,
            frame_id: self.frame_id,
        })
    }
}

/// One captured frame submitted for recognition.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMessage {
    /// Decoded image bytes.
    pub data: Bytes,
    /// Client-assigned sequence number, unique per connection.
    pub frame_id: u64,
}

/// Recognition toggle requested by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    StartDetection,
    StopDetection,
    Unknown(String),
}

impl Command {
    fn from_action(action: &str) -> Self {
        match action {
            "start_detection" => Self::StartDetection,
            "stop_detection" => Self::StopDetection,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    data: Option<String>,
    #[serde(rename = "frameId")]
    frame_id: u64,
}

#[derive(Deserialize)]
struct RawCommand {
    action: String,
}

/// Decode a text message received from a client.
pub fn decode(raw: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(ref fields) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let kind = fields
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    match kind {
        "frame" => {
            let frame: RawFrame =
                serde_json::from_value(value.clone()).map_err(|e| DecodeError::InvalidFields {
                    kind: "frame",
                    reason: e.to_string(),
                })?;
            Ok(Inbound::Frame(EncodedFrame {
                data: frame.data.unwrap_or_default(),
                frame_id: frame.frame_id,
            }))
        }
        "command" => {
            let command: RawCommand =
                serde_json::from_value(value.clone()).map_err(|e| DecodeError::InvalidFields {
                    kind: "command",
                    reason: e.to_string(),
                })?;
            Ok(Inbound::Command(Command::from_action(&command.action)))
        }
        other => Ok(Inbound::Unknown(other.to_string())),
    }
}

/// Decode a binary WebSocket message; only UTF-8 JSON is accepted.
pub fn decode_binary(raw: &[u8]) -> Result<Inbound, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::NotUtf8)?;
    decode(text)
}

/// Decode frame data: plain base64 or a `data:<mime>;base64,<payload>` URL.
pub fn decode_frame_data(data: &str) -> Result<Bytes, DecodeError> {
    let payload = match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    if payload.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }
    Ok(Bytes::from(bytes))
}

/// Acknowledged activation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    DetectionStarted,
    DetectionStopped,
}

/// A server → client message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        message: String,
    },
    Status {
        status: DetectionStatus,
    },
    Detection {
        text: String,
        #[serde(rename = "frameId")]
        frame_id: u64,
    },
}

impl ServerMessage {
    pub fn welcome() -> Self {
        Self::Connection {
            message: WELCOME_MESSAGE.to_string(),
        }
    }

    pub fn status(status: DetectionStatus) -> Self {
        Self::Status { status }
    }

    pub fn detection(text: impl Into<String>, frame_id: u64) -> Self {
        Self::Detection {
            text: text.into(),
            frame_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
