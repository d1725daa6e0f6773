//! In-process pub/sub bus
//!
//! Every node attached to a [`MemoryBus`] sees every frame published on the
//! topics it subscribed to, including its own, the way public pub/sub
//! networks echo a publisher's messages back to it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use super::{Frame, FrameStream, PeerId, PubSub};
use crate::error::LobbyResult;

/// Shared in-memory topic registry
#[derive(Clone, Default)]
pub struct MemoryBus {
    topics: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Frame>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node with the given peer id
    pub fn node(&self, peer_id: impl Into<PeerId>) -> MemoryNode {
        MemoryNode {
            bus: self.clone(),
            peer_id: peer_id.into(),
        }
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let mut topics = self.topics.lock();
        match topics.get_mut(topic) {
            Some(subscribers) => {
                subscribers.retain(|tx| !tx.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }

    fn deliver(&self, topic: &str, frame: Frame) {
        let mut topics = self.topics.lock();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
            trace!(topic, from = %frame.from, receivers = subscribers.len(), "Delivered frame");
        }
    }
}

/// One node on a [`MemoryBus`]
#[derive(Clone)]
pub struct MemoryNode {
    bus: MemoryBus,
    peer_id: PeerId,
}

impl PubSub for MemoryNode {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn subscribe(&self, topic: &str) -> LobbyResult<FrameStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus
            .topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> LobbyResult<()> {
        self.bus.deliver(topic, Frame::new(self.peer_id.clone(), data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_including_self() {
        let bus = MemoryBus::new();
        let a = bus.node("a");
        let b = bus.node("b");

        let mut a_rx = a.subscribe("topic").await.unwrap();
        let mut b_rx = b.subscribe("topic").await.unwrap();

        a.publish("topic", b"hello".to_vec()).await.unwrap();

        assert_eq!(a_rx.recv().await.unwrap(), Frame::new("a", b"hello".to_vec()));
        assert_eq!(b_rx.recv().await.unwrap(), Frame::new("a", b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryBus::new();
        let a = bus.node("a");
        let mut rx = a.subscribe("one").await.unwrap();

        a.publish("two", b"elsewhere".to_vec()).await.unwrap();
        a.publish("one", b"here".to_vec()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().data, b"here".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_stream_unsubscribes() {
        let bus = MemoryBus::new();
        let a = bus.node("a");

        let rx = a.subscribe("topic").await.unwrap();
        assert_eq!(bus.subscriber_count("topic"), 1);

        drop(rx);
        a.publish("topic", b"x".to_vec()).await.unwrap();
        assert_eq!(bus.subscriber_count("topic"), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        assert!(bus.node("a").publish("nobody", b"x".to_vec()).await.is_ok());
    }
}
