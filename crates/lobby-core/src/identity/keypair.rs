//! Device keystore backed by an ed25519 keypair

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::LobbyError;
use crate::identity::RootIdentity;

/// Local keystore: this device's identity and the ability to sign with it.
pub trait Keystore: Send + Sync {
    /// This device's own identity
    fn did(&self) -> RootIdentity;

    /// Sign `message`, returning the raw signature bytes
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// ed25519 keypair identifying this device
pub struct DeviceKeypair {
    signing: SigningKey,
}

impl DeviceKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        // Seed from getrandom directly to avoid rand_core version conflicts
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("Failed to get random bytes");
        Self::from_bytes(&seed)
    }

    /// Rebuild a keypair from its 32-byte secret seed
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild a keypair from a stored seed of unchecked length
    pub fn from_slice(bytes: &[u8]) -> Result<Self, LobbyError> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            LobbyError::Identity(format!("Device key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_bytes(&seed))
    }

    /// The 32-byte secret seed
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

impl Keystore for DeviceKeypair {
    fn did(&self) -> RootIdentity {
        RootIdentity::from_ed25519(&self.public_key())
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.sign_message(message).to_bytes().to_vec()
    }
}

impl Clone for DeviceKeypair {
    fn clone(&self) -> Self {
        Self::from_bytes(&self.to_bytes())
    }
}

impl std::fmt::Debug for DeviceKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeypair")
            .field("public", &hex::encode(self.public_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Verify a raw ed25519 signature made by the holder of a `did:key` identity.
pub fn verify_signature(
    signer: &RootIdentity,
    message: &[u8],
    signature: &[u8],
) -> Result<(), LobbyError> {
    let key = signer.ed25519_key()?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| LobbyError::Identity(format!("Malformed signature: {}", e)))?;

    key.verify(message, &signature)
        .map_err(|_| LobbyError::Identity(format!("Signature does not verify for {}", signer)))
}
