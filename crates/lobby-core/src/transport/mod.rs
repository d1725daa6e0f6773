//! Publish/subscribe transports
//!
//! A [`PubSub`] transport moves opaque frames between peers sharing a topic
//! name. Delivery is best effort: frames can be lost, reordered or
//! duplicated, and a node may receive its own publications.
//!
//! - [`MemoryBus`]: in-process bus for tests and local demos
//! - [`GossipTransport`]: iroh endpoint running iroh-gossip

mod gossip;
mod memory;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LobbyResult;

pub use gossip::{topic_id, GossipTransport};
pub use memory::{MemoryBus, MemoryNode};

/// Transport-level identifier of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Raw bytes received on a topic, tagged with the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub from: PeerId,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(from: impl Into<PeerId>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            from: from.into(),
            data: data.into(),
        }
    }
}

/// Frames arriving on one subscription. Dropping it ends the subscription.
pub type FrameStream = mpsc::UnboundedReceiver<Frame>;

/// A running pub/sub-capable network node.
pub trait PubSub: Send + Sync + 'static {
    /// This node's identifier, as it appears in [`Frame::from`]
    fn local_peer_id(&self) -> PeerId;

    /// Start receiving frames published on `topic`
    fn subscribe(&self, topic: &str) -> impl Future<Output = LobbyResult<FrameStream>> + Send;

    /// Publish `data` to every subscriber of `topic`
    fn publish(&self, topic: &str, data: Vec<u8>) -> impl Future<Output = LobbyResult<()>> + Send;
}
