//! Secure channels: handshake, heartbeat, frame classification and dispatch
//!
//! ## Overview
//!
//! - **SecureChannel**: owns one topic subscription and its dispatcher task
//! - **Heartbeat**: PINGs the topic until a PONG arrives
//! - **classify**: decides what a received frame is
//! - **ChannelEvent**: what the channel reports back to its owner

mod classify;
mod events;
mod heartbeat;
mod secure;

pub use classify::{classify, classify_bytes, FrameKind, PING, PONG};
pub use events::{ApplicationMessage, ChannelEvent, ChannelState};
pub use heartbeat::Heartbeat;
pub use secure::SecureChannel;
