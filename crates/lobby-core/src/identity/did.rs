//! Root identity strings
//!
//! A [`RootIdentity`] is an opaque decentralized identifier. It names the
//! principal that signs payloads and, verbatim, the pub/sub topic both
//! sides of a pairing meet on.
//!
//! Identities minted on this device use the `did:key` method:
//! `did:key:z{base58btc(0xed 0x01 || ed25519 public key)}`.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::LobbyError;

const DID_KEY_PREFIX: &str = "did:key:z";

/// Multicodec varint for an ed25519 public key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Opaque identity string, doubling as pub/sub topic and signing principal
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootIdentity(String);

impl RootIdentity {
    /// Wrap an identity string as-is. No format is enforced.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `did:key` identity for an ed25519 public key
    pub fn from_ed25519(key: &VerifyingKey) -> Self {
        let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + 32);
        bytes.extend_from_slice(&ED25519_MULTICODEC);
        bytes.extend_from_slice(key.as_bytes());
        Self(format!("{}{}", DID_KEY_PREFIX, bs58::encode(bytes).into_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The string used as the pub/sub topic
    pub fn topic(&self) -> &str {
        &self.0
    }

    pub fn is_did_key(&self) -> bool {
        self.0.starts_with(DID_KEY_PREFIX)
    }

    /// Recover the ed25519 verifying key from a `did:key` identity
    pub fn ed25519_key(&self) -> Result<VerifyingKey, LobbyError> {
        let encoded = self.0.strip_prefix(DID_KEY_PREFIX).ok_or_else(|| {
            LobbyError::InvalidDidFormat(format!("not a did:key identity: {}", self.0))
        })?;

        let bytes = bs58::decode(encoded).into_vec().map_err(|_| {
            LobbyError::InvalidDidFormat("invalid base58 encoding in did:key".to_string())
        })?;

        let key_bytes = bytes
            .strip_prefix(&ED25519_MULTICODEC[..])
            .ok_or_else(|| LobbyError::InvalidDidFormat("did:key is not ed25519".to_string()))?;

        let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| {
            LobbyError::InvalidDidFormat(format!(
                "ed25519 key must be 32 bytes, got {}",
                key_bytes.len()
            ))
        })?;

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| LobbyError::InvalidDidFormat(format!("invalid ed25519 key: {}", e)))
    }
}

impl fmt::Display for RootIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RootIdentity {
    type Err = LobbyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LobbyError::InvalidDidFormat(
                "identity cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for RootIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RootIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RootIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceKeypair;

    #[test]
    fn test_did_key_format() {
        let keypair = DeviceKeypair::generate();
        let did = RootIdentity::from_ed25519(&keypair.public_key());

        // ed25519 did:keys always start with z6Mk
        assert!(did.as_str().starts_with("did:key:z6Mk"), "got {}", did);
        assert!(did.is_did_key());
    }

    #[test]
    fn test_did_key_roundtrip_to_verifying_key() {
        let keypair = DeviceKeypair::generate();
        let did = RootIdentity::from_ed25519(&keypair.public_key());

        let recovered = did.ed25519_key().unwrap();
        assert_eq!(recovered, keypair.public_key());
    }

    #[test]
    fn test_opaque_identity_has_no_key() {
        let id = RootIdentity::new("did:web:alice.example");
        assert!(!id.is_did_key());
        assert!(matches!(
            id.ed25519_key(),
            Err(LobbyError::InvalidDidFormat(_))
        ));
    }

    #[test]
    fn test_did_key_invalid_payload() {
        // Invalid base58 characters
        assert!(RootIdentity::new("did:key:z0OIl").ed25519_key().is_err());

        // Wrong multicodec prefix (secp256k1 is 0xe7 0x01)
        let mut bytes = vec![0xe7, 0x01];
        bytes.extend_from_slice(&[7u8; 33]);
        let id = RootIdentity::new(format!("did:key:z{}", bs58::encode(bytes).into_string()));
        assert!(id.ed25519_key().is_err());

        // Truncated key
        let id = RootIdentity::new(format!(
            "did:key:z{}",
            bs58::encode([0xed, 0x01, 1, 2, 3]).into_string()
        ));
        assert!(id.ed25519_key().is_err());
    }

    #[test]
    fn test_topic_is_identity() {
        let id = RootIdentity::new("did:key:z6MkAbc");
        assert_eq!(id.topic(), id.as_str());
        assert_eq!(format!("{}", id), "did:key:z6MkAbc");
    }

    #[test]
    fn test_from_str_rejects_empty() {
        assert!("".parse::<RootIdentity>().is_err());
        assert!("   ".parse::<RootIdentity>().is_err());

        let id: RootIdentity = " did:key:z6MkAbc ".parse().unwrap();
        assert_eq!(id.as_str(), "did:key:z6MkAbc");
    }

    #[test]
    fn test_serde_is_plain_string() {
        let id = RootIdentity::new("did:key:z6MkAbc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""did:key:z6MkAbc""#);

        let recovered: RootIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, id);
    }
}
