//! Outgoing payload preparation: placeholder expansion, signing, encryption
//!
//! Application payloads are JSON objects. Two keys act as placeholders: if
//! present (whatever their value), the codec fills them in before sending.
//!
//! | Key         | Filled with                                              |
//! |-------------|----------------------------------------------------------|
//! | `did`       | this device's identity                                   |
//! | `signature` | base64 ed25519 signature over the canonical payload      |
//!
//! The signature covers the payload exactly as the caller handed it over,
//! minus `signature`: a `did` placeholder is signed with its placeholder
//! value and only filled in afterwards. The signed form is serialized as
//! compact JSON with object keys sorted.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

use crate::crypto;
use crate::error::{LobbyError, LobbyResult};
use crate::identity::{verify_signature, Keystore, RootIdentity};

/// Placeholder key for the signature
pub const SIGNATURE_FIELD: &str = "signature";

/// Placeholder key for the sender's identity
pub const DID_FIELD: &str = "did";

/// Prepares outgoing payloads using the local keystore.
#[derive(Clone)]
pub struct PayloadCodec {
    keystore: Arc<dyn Keystore>,
}

impl PayloadCodec {
    pub fn new(keystore: Arc<dyn Keystore>) -> Self {
        Self { keystore }
    }

    /// This device's identity, used for the `did` placeholder
    pub fn local_identity(&self) -> RootIdentity {
        self.keystore.did()
    }

    /// Expand placeholders and serialize `payload` to JSON text.
    pub fn prepare_outgoing(&self, payload: Map<String, Value>) -> LobbyResult<String> {
        let prepared = self.expand_placeholders(payload)?;
        Ok(serde_json::to_string(&canonicalize(&Value::Object(prepared)))?)
    }

    /// Like [`prepare_outgoing`](Self::prepare_outgoing), then encrypt the
    /// JSON text under `passphrase`.
    pub fn prepare_encrypted(
        &self,
        payload: Map<String, Value>,
        passphrase: &str,
    ) -> LobbyResult<String> {
        let json = self.prepare_outgoing(payload)?;
        crypto::encrypt(&json, passphrase)
    }

    fn expand_placeholders(
        &self,
        mut payload: Map<String, Value>,
    ) -> LobbyResult<Map<String, Value>> {
        let signature = if payload.contains_key(SIGNATURE_FIELD) {
            let message = canonical_bytes(&payload)?;
            debug!(len = message.len(), "Signed outgoing payload");
            Some(STANDARD.encode(self.keystore.sign(&message)))
        } else {
            None
        };

        if payload.contains_key(DID_FIELD) {
            payload.insert(
                DID_FIELD.to_string(),
                Value::String(self.keystore.did().to_string()),
            );
        }
        if let Some(signature) = signature {
            payload.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));
        }

        Ok(payload)
    }
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("identity", &self.keystore.did())
            .finish()
    }
}

/// Bytes the signature covers: the payload minus `signature`, compact,
/// with keys sorted at every level.
pub fn canonical_bytes(payload: &Map<String, Value>) -> LobbyResult<Vec<u8>> {
    let mut unsigned = payload.clone();
    unsigned.remove(SIGNATURE_FIELD);
    Ok(serde_json::to_vec(&canonicalize(&Value::Object(unsigned)))?)
}

/// Rebuild `value` with object keys in lexicographic order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Verify the `signature` field of a received payload.
///
/// The signer is `signer` if given, otherwise the payload's own `did` field.
/// Senders sign before filling in `did`, so a present `did` is put back to
/// `null` before checking; use [`verify_payload_with_placeholder`] when the
/// sender used another placeholder value. Returns the identity the
/// signature was checked against.
pub fn verify_payload(
    payload: &Map<String, Value>,
    signer: Option<&RootIdentity>,
) -> LobbyResult<RootIdentity> {
    verify_payload_with_placeholder(payload, signer, &Value::Null)
}

/// [`verify_payload`] with the `did` placeholder value the sender signed
pub fn verify_payload_with_placeholder(
    payload: &Map<String, Value>,
    signer: Option<&RootIdentity>,
    did_placeholder: &Value,
) -> LobbyResult<RootIdentity> {
    let signer = match signer {
        Some(signer) => signer.clone(),
        None => match payload.get(DID_FIELD) {
            Some(Value::String(did)) => RootIdentity::new(did.clone()),
            _ => {
                return Err(LobbyError::Identity(
                    "Payload has no did to verify against".to_string(),
                ))
            }
        },
    };

    let Some(Value::String(encoded)) = payload.get(SIGNATURE_FIELD) else {
        return Err(LobbyError::Identity("Payload is not signed".to_string()));
    };
    let signature = STANDARD
        .decode(encoded)
        .map_err(|e| LobbyError::Identity(format!("Signature is not base64: {}", e)))?;

    let mut signed = payload.clone();
    if signed.contains_key(DID_FIELD) {
        signed.insert(DID_FIELD.to_string(), did_placeholder.clone());
    }
    verify_signature(&signer, &canonical_bytes(&signed)?, &signature)?;
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceKeypair;
    use serde_json::json;

    fn codec() -> (PayloadCodec, DeviceKeypair) {
        let device = DeviceKeypair::generate();
        (PayloadCodec::new(Arc::new(device.clone())), device)
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_plain_payload_untouched() {
        let (codec, _) = codec();
        let text = codec
            .prepare_outgoing(object(json!({"b": 2, "a": 1})))
            .unwrap();
        assert_eq!(text, r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_did_placeholder_filled() {
        let (codec, device) = codec();
        let text = codec
            .prepare_outgoing(object(json!({"did": null, "x": true})))
            .unwrap();

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["did"], json!(device.did().as_str()));
        assert_eq!(parsed["x"], json!(true));
    }

    #[test]
    fn test_signature_placeholder_signs_rest_of_payload() {
        let (codec, device) = codec();
        let text = codec
            .prepare_outgoing(object(json!({"a": 1, "signature": null})))
            .unwrap();

        let parsed = object(serde_json::from_str(&text).unwrap());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["a"], json!(1));

        let signature = STANDARD
            .decode(parsed["signature"].as_str().unwrap())
            .unwrap();
        assert!(verify_signature(&device.did(), br#"{"a":1}"#, &signature).is_ok());
    }

    #[test]
    fn test_signature_covers_did_placeholder() {
        let (codec, device) = codec();
        let text = codec
            .prepare_outgoing(object(json!({"a": 1, "did": null, "signature": null})))
            .unwrap();

        let parsed = object(serde_json::from_str(&text).unwrap());
        assert_eq!(parsed["did"], json!(device.did().as_str()));

        let signature = STANDARD
            .decode(parsed["signature"].as_str().unwrap())
            .unwrap();
        assert!(verify_signature(&device.did(), br#"{"a":1,"did":null}"#, &signature).is_ok());

        // The filled-in identity is not what was signed
        let filled = format!(r#"{{"a":1,"did":"{}"}}"#, device.did());
        assert!(verify_signature(&device.did(), filled.as_bytes(), &signature).is_err());

        assert_eq!(verify_payload(&parsed, None).unwrap(), device.did());
    }

    #[test]
    fn test_verify_with_custom_placeholder() {
        let (codec, device) = codec();
        let text = codec
            .prepare_outgoing(object(json!({
                "did": "compute me",
                "signature": "",
                "msg": "hi",
            })))
            .unwrap();

        let parsed = object(serde_json::from_str(&text).unwrap());
        assert!(verify_payload(&parsed, None).is_err());
        assert_eq!(
            verify_payload_with_placeholder(&parsed, None, &json!("compute me")).unwrap(),
            device.did()
        );
    }

    #[test]
    fn test_canonical_bytes_sorts_nested_keys() {
        let payload = object(json!({"z": {"b": 1, "a": [{"d": 0, "c": 0}]}, "signature": "x"}));
        assert_eq!(
            canonical_bytes(&payload).unwrap(),
            br#"{"z":{"a":[{"c":0,"d":0}],"b":1}}"#.to_vec()
        );
    }

    #[test]
    fn test_verify_rejects_modified_payload() {
        let (codec, device) = codec();
        let text = codec
            .prepare_outgoing(object(json!({"amount": 1, "signature": null})))
            .unwrap();

        let mut parsed = object(serde_json::from_str(&text).unwrap());
        parsed.insert("amount".to_string(), json!(1000));
        assert!(verify_payload(&parsed, Some(&device.did())).is_err());
    }

    #[test]
    fn test_verify_requires_signature_and_signer() {
        let (_, device) = codec();
        assert!(verify_payload(&object(json!({"a": 1})), Some(&device.did())).is_err());
        assert!(verify_payload(&object(json!({"signature": "AAAA"})), None).is_err());
    }

    #[test]
    fn test_prepare_encrypted_decrypts_to_prepared_json() {
        let (codec, _) = codec();
        let envelope = codec
            .prepare_encrypted(object(json!({"hello": "world"})), "pw")
            .unwrap();

        assert_eq!(
            crypto::decrypt(&envelope, "pw").unwrap(),
            r#"{"hello":"world"}"#
        );
    }
}
