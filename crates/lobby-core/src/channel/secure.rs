//! Secure channel over a public pub/sub topic
//!
//! ## Handshake
//!
//! ```text
//!   initiator (knows peer name)            owner (topic = own identity)
//!   ───────────────────────────            ────────────────────────────
//!   resolve name → topic                   resolve → own identity
//!   subscribe(topic)                       subscribe(topic)
//!   state = AwaitingPong                   state = Open
//!   PING every interval ───────────────▶
//!                         ◀─────────────── PONG
//!   cancel heartbeat
//!   state = Open, emit Opened
//! ```
//!
//! Every node answers PING with PONG whatever its own state. A node's own
//! frames echoed back by the transport are dropped before classification.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::classify::{classify_bytes, FrameKind, PONG};
use super::events::{ApplicationMessage, ChannelEvent, ChannelState};
use super::heartbeat::Heartbeat;
use crate::codec::PayloadCodec;
use crate::config::HeartbeatConfig;
use crate::crypto::PassphraseCipher;
use crate::error::{LobbyError, LobbyResult};
use crate::identity::{IdentityDirectory, IdentityResolver, RootIdentity};
use crate::transport::{Frame, FrameStream, PeerId, PubSub};

/// Mutable channel state shared with the dispatcher and heartbeat tasks
#[derive(Debug, Default)]
struct Shared {
    state: ChannelState,
    heartbeat: Option<Heartbeat>,
}

/// One subscription to a topic running the PING/PONG handshake.
pub struct SecureChannel<T: PubSub> {
    topic: RootIdentity,
    local_peer: PeerId,
    transport: Arc<T>,
    shared: Arc<parking_lot::Mutex<Shared>>,
    cancel: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl<T: PubSub> SecureChannel<T> {
    /// Open a channel.
    ///
    /// The topic is the root identity `resolver` yields for `peer_name`.
    /// With a peer name this side is the initiator and starts a heartbeat;
    /// without one it owns the topic and is open right away.
    ///
    /// Events go to `events`; the channel keeps running if the receiver is
    /// dropped.
    pub async fn open<D, E>(
        resolver: &IdentityResolver<D>,
        transport: Arc<T>,
        peer_name: Option<&str>,
        heartbeat: HeartbeatConfig,
        events: mpsc::UnboundedSender<E>,
    ) -> LobbyResult<Self>
    where
        D: IdentityDirectory,
        E: From<ChannelEvent> + Send + 'static,
    {
        let topic = resolver.resolve(peer_name).await?;
        let local_peer = transport.local_peer_id();

        let shared = Arc::new(parking_lot::Mutex::new(Shared {
            state: ChannelState::Opening,
            heartbeat: None,
        }));

        let frames = transport.subscribe(topic.as_str()).await?;
        info!(
            %topic,
            local = %local_peer.short(),
            initiator = peer_name.is_some(),
            "Subscribed to secure channel"
        );

        if peer_name.is_some() {
            let on_timeout = {
                let shared = shared.clone();
                let events = events.clone();
                let topic = topic.clone();
                let after_ms = heartbeat.timeout_ms.unwrap_or_default();
                move || {
                    let mut guard = shared.lock();
                    if guard.heartbeat.take().is_some() {
                        guard.state = ChannelState::TimedOut;
                        drop(guard);
                        let event = ChannelEvent::HandshakeTimeout { topic, after_ms };
                        let _ = events.send(E::from(event));
                    }
                }
            };
            let mut guard = shared.lock();
            guard.state = ChannelState::AwaitingPong;
            guard.heartbeat = Some(Heartbeat::spawn(
                transport.clone(),
                topic.clone(),
                heartbeat,
                on_timeout,
            ));
        } else {
            shared.lock().state = ChannelState::Open;
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher {
            topic: topic.clone(),
            local_peer: local_peer.clone(),
            transport: transport.clone(),
            shared: shared.clone(),
            events,
            cipher: None,
        };
        let dispatcher = tokio::spawn(dispatcher.run(frames, cancel.clone()));

        Ok(Self {
            topic,
            local_peer,
            transport,
            shared,
            cancel,
            dispatcher,
        })
    }

    /// The topic (root identity) this channel is subscribed to
    pub fn topic(&self) -> &RootIdentity {
        &self.topic
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    /// True while a heartbeat is waiting for a PONG
    pub fn heartbeat_active(&self) -> bool {
        self.shared.lock().heartbeat.is_some()
    }

    /// Publish raw frame text on the topic
    pub async fn send_text(&self, text: &str) -> LobbyResult<()> {
        if self.state() == ChannelState::Closed {
            return Err(LobbyError::InvalidOperation(
                "Cannot publish on a closed channel".to_string(),
            ));
        }
        self.transport
            .publish(self.topic.as_str(), text.as_bytes().to_vec())
            .await
    }

    /// Expand placeholders in `payload` and publish it as JSON
    pub async fn publish(
        &self,
        codec: &PayloadCodec,
        payload: Map<String, Value>,
    ) -> LobbyResult<()> {
        let text = codec.prepare_outgoing(payload)?;
        debug!(topic = %self.topic, len = text.len(), "Publishing payload");
        self.send_text(&text).await
    }

    /// Expand placeholders, encrypt under `passphrase` (default: the topic)
    /// and publish the envelope
    pub async fn publish_encrypted(
        &self,
        codec: &PayloadCodec,
        payload: Map<String, Value>,
        passphrase: Option<&str>,
    ) -> LobbyResult<()> {
        let passphrase = passphrase.unwrap_or(self.topic.as_str()).to_string();
        let json = codec.prepare_outgoing(payload)?;
        let envelope = tokio::task::spawn_blocking(move || {
            PassphraseCipher::new(&passphrase)?.encrypt(&json)
        })
        .await
        .map_err(|e| LobbyError::Crypto(format!("Encryption task failed: {}", e)))??;
        debug!(topic = %self.topic, len = envelope.len(), "Publishing encrypted payload");
        self.send_text(&envelope).await
    }

    /// Stop the heartbeat and the dispatcher. Idempotent.
    pub fn close(&self) {
        let heartbeat = {
            let mut guard = self.shared.lock();
            guard.state = ChannelState::Closed;
            guard.heartbeat.take()
        };
        if let Some(heartbeat) = heartbeat {
            heartbeat.cancel();
        }
        if !self.cancel.is_cancelled() {
            info!(topic = %self.topic, "Closing secure channel");
            self.cancel.cancel();
        }
    }

    /// True once the dispatcher has stopped
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_finished()
    }
}

impl<T: PubSub> Drop for SecureChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: PubSub> std::fmt::Debug for SecureChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("topic", &self.topic)
            .field("local_peer", &self.local_peer)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-channel frame handler; frames are handled one at a time
struct Dispatcher<T, E> {
    topic: RootIdentity,
    local_peer: PeerId,
    transport: Arc<T>,
    shared: Arc<parking_lot::Mutex<Shared>>,
    events: mpsc::UnboundedSender<E>,
    /// Key derived from the topic, built on the first encrypted frame
    cipher: Option<Arc<PassphraseCipher>>,
}

impl<T, E> Dispatcher<T, E>
where
    T: PubSub,
    E: From<ChannelEvent> + Send + 'static,
{
    async fn run(mut self, mut frames: FrameStream, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!(topic = %self.topic, "Frame stream ended");
                        break;
                    }
                },
            };
            self.handle(frame).await;
        }
        debug!(topic = %self.topic, "Dispatcher stopped");
    }

    async fn handle(&mut self, frame: Frame) {
        if frame.from == self.local_peer {
            trace!(topic = %self.topic, "Dropping own frame");
            return;
        }

        match classify_bytes(&frame.data) {
            FrameKind::Ping => {
                trace!(topic = %self.topic, from = %frame.from.short(), "PING → PONG");
                if let Err(e) = self
                    .transport
                    .publish(self.topic.as_str(), PONG.as_bytes().to_vec())
                    .await
                {
                    warn!(topic = %self.topic, error = %e, "Failed to publish PONG");
                }
            }
            FrameKind::Pong => self.on_pong(&frame.from),
            FrameKind::Plain(value) => {
                self.emit(ChannelEvent::Message(ApplicationMessage::received(
                    value, frame.from, false,
                )));
            }
            FrameKind::Encrypted(envelope) => match self.decrypt(envelope).await {
                Ok(value) => {
                    self.emit(ChannelEvent::Message(ApplicationMessage::received(
                        value, frame.from, true,
                    )));
                }
                Err(e) => {
                    warn!(
                        topic = %self.topic,
                        from = %frame.from.short(),
                        error = %e,
                        "Dropping undecryptable frame"
                    );
                }
            },
        }
    }

    fn on_pong(&self, from: &PeerId) {
        let heartbeat = {
            let mut guard = self.shared.lock();
            let heartbeat = guard.heartbeat.take();
            if heartbeat.is_some() {
                guard.state = ChannelState::Open;
            }
            heartbeat
        };

        match heartbeat {
            Some(heartbeat) => {
                heartbeat.cancel();
                info!(topic = %self.topic, from = %from.short(), "Secure channel opened");
                self.emit(ChannelEvent::Opened {
                    topic: self.topic.clone(),
                });
            }
            None => trace!(topic = %self.topic, "PONG without heartbeat, ignoring"),
        }
    }

    /// Decrypt with the topic as passphrase and parse the plaintext as JSON
    async fn decrypt(&mut self, envelope: String) -> LobbyResult<Value> {
        let cipher = match &self.cipher {
            Some(cipher) => cipher.clone(),
            None => {
                let passphrase = self.topic.to_string();
                let cipher = tokio::task::spawn_blocking(move || PassphraseCipher::new(&passphrase))
                    .await
                    .map_err(|e| {
                        LobbyError::Crypto(format!("Key derivation task failed: {}", e))
                    })??;
                let cipher = Arc::new(cipher);
                self.cipher = Some(cipher.clone());
                cipher
            }
        };

        let plaintext = cipher.decrypt(&envelope)?;
        serde_json::from_str(&plaintext)
            .map_err(|e| LobbyError::DecryptionFailed(format!("plaintext is not JSON: {}", e)))
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(E::from(event)).is_err() {
            debug!(topic = %self.topic, "Event receiver dropped");
        }
    }
}
