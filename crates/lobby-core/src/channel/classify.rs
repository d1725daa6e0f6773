//! Frame classification
//!
//! Frames carry no type tag. Control words are matched literally, anything
//! else that parses as JSON is a plain payload, and the rest is assumed to be
//! an encrypted envelope.

use serde_json::Value;

/// Heartbeat frame sent by the initiating side
pub const PING: &str = "PING";

/// Reply to [`PING`]
pub const PONG: &str = "PONG";

/// What a received frame turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    Ping,
    Pong,
    /// Parsed JSON payload
    Plain(Value),
    /// Not JSON; candidate encrypted envelope
    Encrypted(String),
}

impl FrameKind {
    pub fn is_control(&self) -> bool {
        matches!(self, FrameKind::Ping | FrameKind::Pong)
    }
}

/// Classify frame text.
pub fn classify(text: &str) -> FrameKind {
    match text {
        PING => FrameKind::Ping,
        PONG => FrameKind::Pong,
        _ => match serde_json::from_str::<Value>(text) {
            Ok(value) => FrameKind::Plain(value),
            Err(_) => FrameKind::Encrypted(text.to_string()),
        },
    }
}

/// Classify raw frame bytes; invalid UTF-8 is replaced, never rejected.
pub fn classify_bytes(data: &[u8]) -> FrameKind {
    classify(&String::from_utf8_lossy(data))
}
