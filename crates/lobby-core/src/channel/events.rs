//! Channel state and the events a channel emits
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ChannelState                                                   │
//! │  ├── Closed: no subscription                                    │
//! │  ├── Opening: subscribing to the topic                          │
//! │  ├── AwaitingPong: initiator, heartbeat running                 │
//! │  ├── Open: paired (or owner waiting to be paired with)          │
//! │  └── TimedOut: handshake timeout expired                        │
//! │                                                                 │
//! │  ChannelEvent                                                   │
//! │  ├── Opened: first PONG arrived                                 │
//! │  ├── Message: decoded application payload                       │
//! │  └── HandshakeTimeout: no PONG before the deadline              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde_json::{Map, Value};

use crate::identity::RootIdentity;
use crate::transport::PeerId;

/// Lifecycle state of a [`SecureChannel`](super::SecureChannel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Closed,
    Opening,
    AwaitingPong,
    Open,
    TimedOut,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Closed => write!(f, "Closed"),
            ChannelState::Opening => write!(f, "Opening"),
            ChannelState::AwaitingPong => write!(f, "Awaiting PONG"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::TimedOut => write!(f, "Timed out"),
        }
    }
}

/// An application payload received on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationMessage {
    /// Payload fields; empty when the payload was not a JSON object
    pub fields: Map<String, Value>,
    /// Sender's transport peer id
    pub from: PeerId,
    /// Receive time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Whether the frame arrived as an encrypted envelope
    pub encrypted: bool,
}

impl ApplicationMessage {
    /// Wrap a received payload, stamping it with the current time
    pub fn received(payload: Value, from: PeerId, encrypted: bool) -> Self {
        let fields = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            from,
            timestamp: chrono::Utc::now().timestamp_millis(),
            encrypted,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The payload augmented with `from` and `timestamp`
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("from".to_string(), Value::String(self.from.to_string()));
        map.insert("timestamp".to_string(), Value::from(self.timestamp));
        Value::Object(map)
    }
}

/// Events emitted by a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The peer answered our heartbeat; emitted once per channel
    Opened { topic: RootIdentity },
    /// An application payload arrived
    Message(ApplicationMessage),
    /// No PONG arrived within the configured timeout
    HandshakeTimeout { topic: RootIdentity, after_ms: u64 },
}
