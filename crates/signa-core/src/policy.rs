use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a full frame queue does with one more frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to admit the new one.
    #[default]
    DropOldest,
    /// Refuse the new frame and keep the queue as is.
    RejectNew,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::RejectNew => "reject_new",
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "drop_oldest" => Ok(Self::DropOldest),
            "reject_new" => Ok(Self::RejectNew),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}
