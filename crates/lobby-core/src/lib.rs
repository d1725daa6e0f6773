//! Lobby Link Core Library
//!
//! Pair two devices over a public pub/sub network and exchange signed or
//! encrypted JSON payloads between them.
//!
//! ## Overview
//!
//! A lobby and a linking application share no direct connection. They meet
//! on a topic named after the account's root identity: the application pings
//! the topic until the lobby answers, then both sides exchange payloads that
//! may be signed with the device key or encrypted under a passphrase.
//!
//! ## Core Pieces
//!
//! - **IdentityResolver**: resolves the session's root identity once, then caches it
//! - **PayloadCodec**: placeholder expansion, signing, AES-GCM envelopes
//! - **SecureChannel**: subscription, PING/PONG handshake, frame dispatch
//! - **Lobby**: session object tying the above together behind one event stream
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lobby_core::{
//!     DeviceKeypair, Keystore, LobbyConfig, LobbyEvent, LocalAccounts, Lobby, MemoryBus,
//!     StaticDirectory, Storage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MemoryBus::new();
//!
//!     // The lobby owns the account identity and waits on its own topic
//!     let account = DeviceKeypair::generate();
//!     let (mut lobby, _lobby_events) = Lobby::new(
//!         LobbyConfig::default(),
//!         Storage::in_memory()?,
//!         Arc::new(account.clone()),
//!         StaticDirectory::new(),
//!         Arc::new(bus.node("lobby")),
//!         LocalAccounts::new(),
//!     );
//!     lobby.open_secure_channel(None).await?;
//!
//!     // The application finds that topic by username and pings it
//!     let directory =
//!         StaticDirectory::new().with_user("alice", "fissionuser.net", &account.did());
//!     let (mut app, mut app_events) = Lobby::new(
//!         LobbyConfig::default(),
//!         Storage::in_memory()?,
//!         Arc::new(DeviceKeypair::generate()),
//!         directory,
//!         Arc::new(bus.node("app")),
//!         LocalAccounts::new(),
//!     );
//!     app.open_secure_channel(Some("alice")).await?;
//!
//!     while let Some(event) = app_events.recv().await {
//!         if let LobbyEvent::ChannelOpened { topic } = event {
//!             println!("paired on {}", topic);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod channel;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod lobby;
pub mod storage;
pub mod transport;
pub mod ucan;

// Re-exports
pub use account::{
    is_username_valid, AccountService, LocalAccounts, NewAccount, UsernameAvailability,
};
pub use channel::{
    classify, ApplicationMessage, ChannelEvent, ChannelState, FrameKind, SecureChannel, PING, PONG,
};
pub use codec::{verify_payload, verify_payload_with_placeholder, PayloadCodec};
pub use config::{HeartbeatConfig, LobbyConfig};
pub use crypto::PassphraseCipher;
pub use error::{LobbyError, LobbyResult};
pub use identity::{
    DeviceKeypair, IdentityDirectory, IdentityResolver, Keystore, RootIdentity, StaticDirectory,
};
pub use lobby::{Lobby, LobbyEvent};
pub use storage::Storage;
pub use transport::{Frame, FrameStream, GossipTransport, MemoryBus, MemoryNode, PeerId, PubSub};
pub use ucan::Ucan;
