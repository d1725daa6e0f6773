//! Capability tokens (UCAN)
//!
//! A linked application receives a token delegating authority from the
//! account's root identity (issuer) to the application's identity
//! (audience). Tokens are JWT-shaped:
//!
//! ```text
//! base64url(header) "." base64url(payload) "." base64url(signature)
//! ```
//!
//! The signature is an ed25519 signature by the issuing device over the
//! first two segments. A token may embed its parent token in `prf`, forming
//! a chain whose root names the account that originally granted authority.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{LobbyError, LobbyResult};
use crate::identity::{verify_signature, Keystore, RootIdentity};

/// Version of the token format we emit
pub const UCAN_VERSION: &str = "1.0.0";

/// Deepest proof chain `root_issuer` will follow
const MAX_PROOF_DEPTH: usize = 16;

/// Token header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UcanHeader {
    pub alg: String,
    pub typ: String,
    pub uav: String,
}

impl Default for UcanHeader {
    fn default() -> Self {
        Self {
            alg: "EdDSA".to_string(),
            typ: "JWT".to_string(),
            uav: UCAN_VERSION.to_string(),
        }
    }
}

/// Token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UcanPayload {
    /// Issuer identity
    pub iss: String,
    /// Audience identity
    pub aud: String,
    /// Not valid before (Unix seconds)
    pub nbf: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Encoded parent token, if this is a re-delegation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prf: Option<String>,
    /// Attenuations (capabilities granted)
    #[serde(default)]
    pub att: Vec<serde_json::Value>,
}

/// A decoded capability token
#[derive(Debug, Clone, PartialEq)]
pub struct Ucan {
    pub header: UcanHeader,
    pub payload: UcanPayload,
    signature: Vec<u8>,
    /// `header.payload` exactly as signed
    signed_data: String,
}

impl Ucan {
    /// Issue a token from `issuer` to `audience`, signed by `keystore`.
    ///
    /// Valid from now for `lifetime`. `proof` is the encoded parent token
    /// when delegating authority that was itself delegated.
    pub fn issue(
        keystore: &dyn Keystore,
        issuer: &RootIdentity,
        audience: &RootIdentity,
        lifetime: Duration,
        proof: Option<String>,
    ) -> LobbyResult<Self> {
        let now = chrono::Utc::now().timestamp();
        let exp = i64::try_from(lifetime.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| {
                LobbyError::InvalidToken(format!(
                    "Lifetime of {}s is out of range",
                    lifetime.as_secs()
                ))
            })?;
        let header = UcanHeader::default();
        let payload = UcanPayload {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            nbf: now,
            exp,
            prf: proof,
            att: Vec::new(),
        };

        let signed_data = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?)
        );
        let signature = keystore.sign(signed_data.as_bytes());

        Ok(Self {
            header,
            payload,
            signature,
            signed_data,
        })
    }

    /// Encode as the dotted three-segment string
    pub fn encode(&self) -> String {
        format!(
            "{}.{}",
            self.signed_data,
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }

    /// Decode a token string. Does not check the signature or validity window.
    pub fn decode(token: &str) -> LobbyResult<Self> {
        let mut parts = token.trim().split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(LobbyError::InvalidToken(
                "token must have 3 segments separated by '.'".to_string(),
            ));
        };

        let header: UcanHeader = decode_segment(header_b64, "header")?;
        let payload: UcanPayload = decode_segment(payload_b64, "payload")?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| LobbyError::InvalidToken(format!("signature segment: {}", e)))?;

        Ok(Self {
            header,
            payload,
            signature,
            signed_data: format!("{}.{}", header_b64, payload_b64),
        })
    }

    pub fn issuer(&self) -> RootIdentity {
        RootIdentity::new(self.payload.iss.clone())
    }

    pub fn audience(&self) -> RootIdentity {
        RootIdentity::new(self.payload.aud.clone())
    }

    /// Check the signature against `signer`, a `did:key` identity.
    pub fn verify_signature(&self, signer: &RootIdentity) -> LobbyResult<()> {
        verify_signature(signer, self.signed_data.as_bytes(), &self.signature)
            .map_err(|e| LobbyError::InvalidToken(e.to_string()))
    }

    /// True once the token is past its expiry
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.payload.exp
    }

    /// Remaining validity in whole seconds (zero if expired)
    pub fn remaining_secs(&self) -> u64 {
        (self.payload.exp - chrono::Utc::now().timestamp()).max(0) as u64
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str, name: &str) -> LobbyResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| LobbyError::InvalidToken(format!("{} segment: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| LobbyError::InvalidToken(format!("{} segment: {}", name, e)))
}

/// The issuer at the root of a token's proof chain.
///
/// A token without a proof is its own root.
pub fn root_issuer(token: &str) -> LobbyResult<RootIdentity> {
    let mut current = Ucan::decode(token)?;
    for _ in 0..MAX_PROOF_DEPTH {
        match current.payload.prf.take() {
            Some(parent) => current = Ucan::decode(&parent)?,
            None => return Ok(current.issuer()),
        }
    }
    Err(LobbyError::InvalidToken(format!(
        "proof chain deeper than {}",
        MAX_PROOF_DEPTH
    )))
}
