//! Lobby session: the caller-facing controller
//!
//! A [`Lobby`] owns everything one pairing session needs: the resolved root
//! identity (cached inside its resolver), at most one secure channel, and the
//! event stream the caller listens on. Each request maps onto one of the
//! lower layers and reports its outcome as a [`LobbyEvent`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Lobby                                                          │
//! │  ├── resolver: IdentityResolver (write-once root identity)      │
//! │  ├── codec: PayloadCodec (placeholders, signing)                │
//! │  ├── channel: Option<SecureChannel> (one per session)           │
//! │  ├── accounts: AccountService                                   │
//! │  └── events: mpsc::UnboundedSender<LobbyEvent>                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::account::{
    is_username_valid, AccountService, NewAccount, UsernameAvailability, ACCOUNT_CREATION_FAILED,
};
use crate::channel::{ApplicationMessage, ChannelEvent, ChannelState, SecureChannel};
use crate::codec::PayloadCodec;
use crate::config::LobbyConfig;
use crate::error::{LobbyError, LobbyResult};
use crate::identity::{IdentityDirectory, IdentityResolver, Keystore, RootIdentity};
use crate::storage::Storage;
use crate::transport::PubSub;
use crate::ucan::Ucan;

/// Everything a session reports to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    UsernameAvailability(UsernameAvailability),
    AccountCreated { username: String },
    AccountCreationFailed { message: String },
    ChannelOpened { topic: RootIdentity },
    Message(ApplicationMessage),
    UcanIssued { token: String },
    HandshakeTimeout { topic: RootIdentity, after_ms: u64 },
}

impl From<ChannelEvent> for LobbyEvent {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Opened { topic } => LobbyEvent::ChannelOpened { topic },
            ChannelEvent::Message(message) => LobbyEvent::Message(message),
            ChannelEvent::HandshakeTimeout { topic, after_ms } => {
                LobbyEvent::HandshakeTimeout { topic, after_ms }
            }
        }
    }
}

/// One pairing session
pub struct Lobby<T: PubSub, D, A> {
    config: LobbyConfig,
    storage: Storage,
    keystore: Arc<dyn Keystore>,
    codec: PayloadCodec,
    resolver: IdentityResolver<D>,
    transport: Arc<T>,
    accounts: A,
    channel: Option<SecureChannel<T>>,
    events: mpsc::UnboundedSender<LobbyEvent>,
}

impl<T, D, A> Lobby<T, D, A>
where
    T: PubSub,
    D: IdentityDirectory,
    A: AccountService,
{
    /// Create a session and the receiver its events arrive on.
    pub fn new(
        config: LobbyConfig,
        storage: Storage,
        keystore: Arc<dyn Keystore>,
        directory: D,
        transport: Arc<T>,
        accounts: A,
    ) -> (Self, mpsc::UnboundedReceiver<LobbyEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let resolver = IdentityResolver::new(
            directory,
            config.data_root_domain.clone(),
            storage.clone(),
            keystore.did(),
        );
        let lobby = Self {
            codec: PayloadCodec::new(keystore.clone()),
            config,
            storage,
            keystore,
            resolver,
            transport,
            accounts,
            channel: None,
            events,
        };
        (lobby, rx)
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// This device's own identity
    pub fn local_identity(&self) -> RootIdentity {
        self.keystore.did()
    }

    /// Username of the last account created from this device
    pub fn used_username(&self) -> LobbyResult<Option<String>> {
        self.storage.used_username()
    }

    /// The session's root identity, resolving it on first use
    pub async fn root_identity(&self, peer_name: Option<&str>) -> LobbyResult<RootIdentity> {
        self.resolver.resolve(peer_name).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accounts
    // ═══════════════════════════════════════════════════════════════════════

    /// Check whether `username` is valid and still free.
    ///
    /// Invalid names never reach the account service. A failing service
    /// reports the name as unavailable.
    pub async fn check_username(&self, username: &str) -> LobbyResult<UsernameAvailability> {
        let availability = if is_username_valid(username) {
            let available = match self
                .accounts
                .is_username_available(username, &self.config.data_root_domain)
                .await
            {
                Ok(available) => available,
                Err(e) => {
                    warn!(username, error = %e, "Username availability check failed");
                    false
                }
            };
            UsernameAvailability {
                available,
                valid: true,
            }
        } else {
            UsernameAvailability {
                available: false,
                valid: false,
            }
        };

        debug!(username, ?availability, "Checked username");
        self.emit(LobbyEvent::UsernameAvailability(availability));
        Ok(availability)
    }

    /// Register an account, remembering the username on success.
    ///
    /// Service failures are reported as `AccountCreationFailed` and `Ok(false)`.
    pub async fn create_account(&self, account: NewAccount) -> LobbyResult<bool> {
        let created = match self
            .accounts
            .create_account(&account, &self.config.api_endpoint)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(username = %account.username, error = %e, "Account service failed");
                false
            }
        };

        if created {
            if let Err(e) = self.storage.set_used_username(&account.username) {
                warn!(username = %account.username, error = %e, "Failed to remember username");
            }
            info!(username = %account.username, "Account created");
            self.emit(LobbyEvent::AccountCreated {
                username: account.username,
            });
        } else {
            warn!(username = %account.username, "Account creation refused");
            self.emit(LobbyEvent::AccountCreationFailed {
                message: ACCOUNT_CREATION_FAILED.to_string(),
            });
        }
        Ok(created)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Linking
    // ═══════════════════════════════════════════════════════════════════════

    /// Issue a capability token from the root identity to `audience`.
    ///
    /// When this device holds a stored token, it is embedded as the proof.
    pub async fn link_app(&self, audience: &RootIdentity) -> LobbyResult<String> {
        let issuer = self.resolver.resolve(None).await?;
        let proof = self.storage.ucan()?;
        let lifetime = Duration::from_secs(self.config.ucan_lifetime_secs);

        let token =
            Ucan::issue(self.keystore.as_ref(), &issuer, audience, lifetime, proof)?.encode();
        info!(%issuer, %audience, "Issued capability token");
        self.emit(LobbyEvent::UcanIssued {
            token: token.clone(),
        });
        Ok(token)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Secure channel
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the session's secure channel, closing any previous one first.
    ///
    /// Returns the topic subscribed to.
    pub async fn open_secure_channel(
        &mut self,
        peer_name: Option<&str>,
    ) -> LobbyResult<RootIdentity> {
        self.close_channel();

        let channel = SecureChannel::open(
            &self.resolver,
            self.transport.clone(),
            peer_name,
            self.config.heartbeat.clone(),
            self.events.clone(),
        )
        .await?;
        let topic = channel.topic().clone();
        self.channel = Some(channel);
        Ok(topic)
    }

    /// Prepare `payload` and publish it on the session topic
    pub async fn publish(
        &self,
        peer_name: Option<&str>,
        payload: Map<String, Value>,
    ) -> LobbyResult<()> {
        match self.live_channel() {
            Some(channel) => channel.publish(&self.codec, payload).await,
            None => {
                let topic = self.resolver.resolve(peer_name).await?;
                let text = self.codec.prepare_outgoing(payload)?;
                self.transport.publish(topic.as_str(), text.into_bytes()).await
            }
        }
    }

    /// Prepare `payload`, encrypt it under `passphrase` and publish it on the
    /// session topic
    pub async fn publish_encrypted(
        &self,
        peer_name: Option<&str>,
        passphrase: &str,
        payload: Map<String, Value>,
    ) -> LobbyResult<()> {
        match self.live_channel() {
            Some(channel) => {
                channel
                    .publish_encrypted(&self.codec, payload, Some(passphrase))
                    .await
            }
            None => {
                let topic = self.resolver.resolve(peer_name).await?;
                let codec = self.codec.clone();
                let passphrase = passphrase.to_string();
                let envelope = tokio::task::spawn_blocking(move || {
                    codec.prepare_encrypted(payload, &passphrase)
                })
                .await
                .map_err(|e| LobbyError::Crypto(format!("Encryption task failed: {}", e)))??;
                self.transport
                    .publish(topic.as_str(), envelope.into_bytes())
                    .await
            }
        }
    }

    /// Close the secure channel, if any
    pub fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    pub fn channel(&self) -> Option<&SecureChannel<T>> {
        self.channel.as_ref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ChannelState::Closed)
    }

    fn live_channel(&self) -> Option<&SecureChannel<T>> {
        self.channel
            .as_ref()
            .filter(|c| c.state() != ChannelState::Closed)
    }

    fn emit(&self, event: LobbyEvent) {
        if self.events.send(event).is_err() {
            debug!("Lobby event receiver dropped");
        }
    }
}
