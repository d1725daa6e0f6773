//! iroh-gossip transport
//!
//! Topic names are hashed with BLAKE3 into 32-byte gossip topic ids. Peers
//! find each other through explicit bootstrap endpoint ids; addresses learned
//! out of band can be added to the static discovery provider.

use std::collections::HashMap;
use std::sync::Arc;

use iroh::discovery::static_provider::StaticProvider;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, EndpointId, SecretKey};
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use iroh_gossip::proto::TopicId;
use n0_future::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::{Frame, FrameStream, PeerId, PubSub};
use crate::error::{LobbyError, LobbyResult};
use crate::storage::Storage;

/// Frames are small JSON documents or control words
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Gossip topic id for a topic name
pub fn topic_id(topic: &str) -> TopicId {
    TopicId::from_bytes(*blake3::hash(topic.as_bytes()).as_bytes())
}

/// Pub/sub over an iroh endpoint running the gossip protocol
#[derive(Debug)]
pub struct GossipTransport {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    static_provider: StaticProvider,
    bootstrap: Vec<EndpointId>,
    senders: Arc<parking_lot::Mutex<HashMap<String, Arc<Mutex<GossipSender>>>>>,
}

impl GossipTransport {
    /// Bind an endpoint and spawn the gossip protocol.
    ///
    /// A random secret key is generated if none is given. `bootstrap` lists
    /// the peers every subscription starts out connecting to.
    pub async fn bind(
        secret_key: Option<SecretKey>,
        bootstrap: Vec<EndpointId>,
    ) -> LobbyResult<Self> {
        let secret_key = secret_key.unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));
        let static_provider = StaticProvider::new();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![GOSSIP_ALPN.to_vec()])
            .discovery(static_provider.clone())
            .bind()
            .await
            .map_err(|e| LobbyError::Network(format!("Failed to bind endpoint: {}", e)))?;

        let endpoint_id = endpoint.id();
        info!(%endpoint_id, bootstrap = bootstrap.len(), "Endpoint bound");

        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());

        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        Ok(Self {
            endpoint,
            gossip,
            router,
            static_provider,
            bootstrap,
            senders: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        })
    }

    /// Bind with the endpoint secret kept in `storage`, creating and saving
    /// one on first use so the endpoint id is stable across runs.
    pub async fn from_storage(storage: &Storage, bootstrap: Vec<EndpointId>) -> LobbyResult<Self> {
        let secret_key = match storage.endpoint_secret()? {
            Some(bytes) => SecretKey::from(bytes),
            None => {
                let secret_key = SecretKey::generate(&mut rand::rng());
                storage.save_endpoint_secret(&secret_key.to_bytes())?;
                info!("Generated new endpoint secret");
                secret_key
            }
        };
        Self::bind(Some(secret_key), bootstrap).await
    }

    /// The public identifier other peers use to connect
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Full addressing information (relay URL, direct addresses)
    pub fn endpoint_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// Make a peer's address known without relying on DNS discovery
    pub fn add_peer_addr(&self, endpoint_addr: EndpointAddr) {
        info!(
            peer = %endpoint_addr.id,
            addrs = endpoint_addr.addrs.len(),
            "Adding peer address to static discovery"
        );
        self.static_provider.add_endpoint_info(endpoint_addr);
    }

    /// Gracefully shut down the router and endpoint
    pub async fn shutdown(&self) -> LobbyResult<()> {
        info!("Shutting down gossip transport");

        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }

        self.endpoint.close().await;
        info!("Gossip transport shutdown complete");
        Ok(())
    }
}

impl PubSub for GossipTransport {
    fn local_peer_id(&self) -> PeerId {
        PeerId::new(self.endpoint.id().to_string())
    }

    async fn subscribe(&self, topic: &str) -> LobbyResult<FrameStream> {
        let id = topic_id(topic);
        info!(topic, ?id, peer_count = self.bootstrap.len(), "Subscribing to topic");

        let gossip_topic = self
            .gossip
            .subscribe(id, self.bootstrap.clone())
            .await
            .map_err(|e| LobbyError::Gossip(format!("Failed to subscribe: {}", e)))?;
        let (sender, receiver) = gossip_topic.split();

        let sender = Arc::new(Mutex::new(sender));
        self.senders.lock().insert(topic.to_string(), sender.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let senders = self.senders.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            forward_events(receiver, tx, id).await;

            // Leave the topic unless a newer subscription took it over
            let mut senders = senders.lock();
            if senders.get(&topic).is_some_and(|s| Arc::ptr_eq(s, &sender)) {
                senders.remove(&topic);
                debug!(%topic, "Released gossip sender");
            }
        });
        Ok(rx)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> LobbyResult<()> {
        let sender = self.senders.lock().get(topic).cloned().ok_or_else(|| {
            LobbyError::Transport(format!("Not subscribed to topic {}", topic))
        })?;

        debug!(topic, len = data.len(), "Broadcasting frame");
        let result = sender
            .lock()
            .await
            .broadcast(data.into())
            .await
            .map_err(|e| LobbyError::Gossip(format!("Failed to broadcast: {}", e)));
        result
    }
}

/// Pump gossip events into a frame stream until either side closes
async fn forward_events(
    mut receiver: GossipReceiver,
    tx: mpsc::UnboundedSender<Frame>,
    id: TopicId,
) {
    loop {
        let event = tokio::select! {
            _ = tx.closed() => {
                debug!(topic = ?id, "Frame stream dropped, leaving topic");
                return;
            }
            event = receiver.try_next() => event,
        };

        match event {
            Ok(Some(Event::Received(msg))) => {
                debug!(topic = ?id, from = ?msg.delivered_from, "Received message");
                let frame = Frame::new(msg.delivered_from.to_string(), msg.content.to_vec());
                if tx.send(frame).is_err() {
                    return;
                }
            }
            Ok(Some(Event::NeighborUp(peer))) => {
                info!(topic = ?id, ?peer, "Neighbor joined");
            }
            Ok(Some(Event::NeighborDown(peer))) => {
                info!(topic = ?id, ?peer, "Neighbor left");
            }
            Ok(Some(Event::Lagged)) => {
                warn!(topic = ?id, "Lagged behind on topic");
            }
            Ok(None) => {
                debug!(topic = ?id, "Topic subscription closed");
                return;
            }
            Err(e) => {
                warn!(topic = ?id, error = ?e, "Error receiving from topic");
                return;
            }
        }
    }
}
