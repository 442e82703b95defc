//! Stream events and their wire framing.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable message sent to clients when an invocation fails.
pub const GENERIC_ERROR: &str = "Agent invocation failed";

/// Events emitted for one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The invocation has begun.
    Start,

    /// A drawing-type tool fired while side effects were enabled.
    Drawing { tool: String, args: Value },

    /// Full ordered message history of the completed invocation.
    Messages { messages: Vec<Value> },

    /// Normal end of stream.
    End,

    /// The invocation failed; the stream closes after this frame.
    Error { error: String },
}

impl StreamEvent {
    pub fn generic_error() -> Self {
        Self::Error {
            error: GENERIC_ERROR.to_string(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error { .. })
    }
}

/// Encodes events as `data: <json>\n\n` frames.
///
/// Serialized JSON never contains a raw newline, so every event fits on a
/// single `data:` line and the blank line always terminates exactly one frame.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    frames: u64,
}

impl FrameEncoder {
    pub const PREFIX: &'static str = "data: ";
    pub const TERMINATOR: &'static str = "\n\n";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &StreamEvent) -> Bytes {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(%e, "Failed to serialize stream event");
                format!(r#"{{"type":"error","error":"{GENERIC_ERROR}"}}"#)
            }
        };
        self.frames += 1;
        let mut frame = String::with_capacity(Self::PREFIX.len() + json.len() + Self::TERMINATOR.len());
        frame.push_str(Self::PREFIX);
        frame.push_str(&json);
        frame.push_str(Self::TERMINATOR);
        Bytes::from(frame)
    }

    /// Number of frames encoded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
