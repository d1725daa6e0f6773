//! Identity module for Lobby Link
//!
//! ## Overview
//!
//! - **RootIdentity**: opaque identity string; the pub/sub topic and the
//!   principal whose signatures peers check
//! - **DeviceKeypair**: this device's ed25519 key, exposed through the
//!   [`Keystore`] trait, with a `did:key` identity
//! - **IdentityResolver**: finds the root identity for a session and caches
//!   it for the resolver's lifetime
//!
//! ## Example
//!
//! ```rust
//! use lobby_core::identity::{verify_signature, DeviceKeypair, Keystore};
//!
//! let device = DeviceKeypair::generate();
//! let did = device.did();
//! assert!(did.as_str().starts_with("did:key:z6Mk"));
//!
//! let signature = device.sign(b"hello");
//! assert!(verify_signature(&did, b"hello", &signature).is_ok());
//! ```

mod did;
mod keypair;
mod resolver;

pub use did::RootIdentity;
pub use keypair::{verify_signature, DeviceKeypair, Keystore};
pub use resolver::{did_record_name, IdentityDirectory, IdentityResolver, StaticDirectory};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_identity_workflow() {
        let device = DeviceKeypair::generate();
        let did = device.did();

        // did:key carries the public key, so verification needs nothing else
        let message = b"Integration test message";
        let signature = device.sign(message);
        assert!(verify_signature(&did, message, &signature).is_ok());

        // Restoring the key restores the identity
        let restored = DeviceKeypair::from_bytes(&device.to_bytes());
        assert_eq!(restored.did(), did);
        assert!(verify_signature(&did, message, &restored.sign(message)).is_ok());
    }
}
