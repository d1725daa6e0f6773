//! Edge case and boundary condition tests
//!
//! Unusual inputs to identities, tokens, payloads and configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lobby_core::ucan::root_issuer;
use lobby_core::{
    classify, DeviceKeypair, FrameKind, HeartbeatConfig, IdentityResolver, Keystore, LobbyConfig,
    LobbyError, PayloadCodec, RootIdentity, StaticDirectory, Storage, Ucan,
};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

// ============================================================================
// Identities
// ============================================================================

#[test]
fn test_root_identity_rejects_blank() {
    assert!(RootIdentity::from_str("").is_err());
    assert!(RootIdentity::from_str("   ").is_err());
    assert_eq!(
        RootIdentity::from_str("  did:key:z6MkTrim \n").unwrap().as_str(),
        "did:key:z6MkTrim"
    );
}

#[test]
fn test_non_did_key_identity_has_no_public_key() {
    let id = RootIdentity::new("did:web:example.com");
    assert!(!id.is_did_key());
    assert!(id.ed25519_key().is_err());
}

#[tokio::test]
async fn test_directory_value_is_trimmed() {
    let mut directory = StaticDirectory::new();
    directory.insert("_did.spaced.fissionuser.net", "  did:key:z6MkSpaced\n");

    let resolver = IdentityResolver::new(
        directory,
        "fissionuser.net",
        Storage::in_memory().unwrap(),
        RootIdentity::new("did:key:z6MkDevice"),
    );
    assert_eq!(
        resolver.resolve(Some("spaced")).await.unwrap().as_str(),
        "did:key:z6MkSpaced"
    );
}

#[tokio::test]
async fn test_custom_data_root_domain() {
    let directory = StaticDirectory::from_usernames(
        "example.org",
        [("carol", "did:key:z6MkCarol")],
    );
    let resolver = IdentityResolver::new(
        directory,
        "example.org",
        Storage::in_memory().unwrap(),
        RootIdentity::new("did:key:z6MkDevice"),
    );
    assert_eq!(
        resolver.resolve(Some("carol")).await.unwrap().as_str(),
        "did:key:z6MkCarol"
    );
}

// ============================================================================
// Tokens
// ============================================================================

#[test]
fn test_proof_chain_depth_limit() {
    let device = DeviceKeypair::generate();
    let mut token = Ucan::issue(
        &device,
        &device.did(),
        &device.did(),
        Duration::from_secs(60),
        None,
    )
    .unwrap()
    .encode();

    for _ in 0..20 {
        token = Ucan::issue(
            &device,
            &device.did(),
            &device.did(),
            Duration::from_secs(60),
            Some(token),
        )
        .unwrap()
        .encode();
    }

    assert!(matches!(root_issuer(&token), Err(LobbyError::InvalidToken(_))));
}

#[test]
fn test_broken_proof_fails_root_issuer() {
    let device = DeviceKeypair::generate();
    let token = Ucan::issue(
        &device,
        &device.did(),
        &device.did(),
        Duration::from_secs(60),
        Some("not.a.token".to_string()),
    )
    .unwrap()
    .encode();

    assert!(root_issuer(&token).is_err());
}

// ============================================================================
// Payloads
// ============================================================================

#[test]
fn test_empty_payload() {
    let codec = PayloadCodec::new(Arc::new(DeviceKeypair::generate()));
    assert_eq!(codec.prepare_outgoing(Map::new()).unwrap(), "{}");
}

#[test]
fn test_signature_only_payload_signs_empty_object() {
    let device = DeviceKeypair::generate();
    let codec = PayloadCodec::new(Arc::new(device.clone()));

    let mut payload = Map::new();
    payload.insert("signature".to_string(), json!("compute me"));
    let text = codec.prepare_outgoing(payload).unwrap();

    let parsed: Map<String, Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.len(), 1);
    assert!(lobby_core::verify_payload(&parsed, Some(&device.did())).is_ok());
}

#[test]
fn test_classify_edge_inputs() {
    assert_eq!(classify(""), FrameKind::Encrypted(String::new()));
    assert_eq!(classify("null"), FrameKind::Plain(Value::Null));
    assert_eq!(classify("PINGPONG"), FrameKind::Encrypted("PINGPONG".to_string()));
    assert!(matches!(classify("{\"unterminated\":"), FrameKind::Encrypted(_)));
}

// ============================================================================
// Configuration and storage
// ============================================================================

#[test]
fn test_config_partial_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lobby.json");
    std::fs::write(&path, r#"{"heartbeat": {"timeout_ms": 5000}}"#).unwrap();

    let config = LobbyConfig::load(&path).unwrap();
    assert_eq!(config.heartbeat.interval_ms, 500);
    assert_eq!(config.heartbeat.timeout(), Some(Duration::from_secs(5)));
    assert_eq!(config.data_root_domain, "fissionuser.net");
}

#[test]
fn test_config_missing_file_is_error() {
    let dir = tempdir().unwrap();
    assert!(LobbyConfig::load(dir.path().join("absent.json")).is_err());
}

#[test]
fn test_heartbeat_without_timeout() {
    assert_eq!(HeartbeatConfig::default().timeout(), None);
}

#[test]
fn test_fresh_storage_creates_did_key_device() {
    let storage = Storage::in_memory().unwrap();
    assert!(storage.endpoint_secret().unwrap().is_none());
    let keypair = storage.load_or_create_device_keypair().unwrap();
    assert!(keypair.did().is_did_key());
}
