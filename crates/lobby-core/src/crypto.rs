//! Passphrase encryption using AES-256-GCM
//!
//! Keys are derived from a passphrase with PBKDF2-HMAC-SHA512 (fixed salt,
//! 10 000 rounds). Ciphertext travels as text so it can share the wire with
//! plain JSON frames.
//!
//! # Envelope Format
//!
//! ```text
//! base64(iv: 12 bytes) ++ base64(ciphertext + tag: 16 bytes)
//! ```
//!
//! A 12-byte IV always encodes to exactly 16 base64 characters without
//! padding, so the two halves need no separator.
//!
//! # Example
//!
//! ```
//! use lobby_core::crypto;
//!
//! let envelope = crypto::encrypt(r#"{"hello":"world"}"#, "correct horse").unwrap();
//! let plaintext = crypto::decrypt(&envelope, "correct horse").unwrap();
//! assert_eq!(plaintext, r#"{"hello":"world"}"#);
//!
//! assert!(crypto::decrypt(&envelope, "battery staple").is_err());
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha512;

use crate::error::{LobbyError, LobbyResult};

/// IV size for AES-GCM (12 bytes)
pub const IV_SIZE: usize = 12;

/// Length of the base64-encoded IV at the start of every envelope
pub const IV_B64_LEN: usize = 16;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Salt for passphrase key derivation
pub const KDF_SALT: &[u8] = b"fission";

/// PBKDF2 rounds for passphrase key derivation
pub const KDF_ITERATIONS: u32 = 10_000;

/// Derive a 256-bit AES key from a passphrase.
pub fn derive_key(passphrase: &str) -> LobbyResult<[u8; 32]> {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha512>>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key)
        .map_err(|e| LobbyError::Crypto(format!("PBKDF2-HMAC-SHA512 failed: {}", e)))?;
    Ok(key)
}

/// AES-256-GCM cipher keyed from a passphrase.
///
/// Key derivation is deliberately slow; build one cipher and reuse it when
/// handling many frames under the same passphrase.
pub struct PassphraseCipher {
    cipher: Aes256Gcm,
}

impl PassphraseCipher {
    /// Derive the key for `passphrase` and build a cipher from it
    pub fn new(passphrase: &str) -> LobbyResult<Self> {
        Ok(Self::from_key(&derive_key(passphrase)?))
    }

    /// Build a cipher from an already-derived key
    pub fn from_key(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Encrypt `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> LobbyResult<String> {
        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, &iv)
    }

    /// Encrypt `plaintext` under a caller-chosen IV.
    ///
    /// The IV must never repeat for the same passphrase.
    pub fn encrypt_with_iv(&self, plaintext: &str, iv: &[u8; IV_SIZE]) -> LobbyResult<String> {
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(iv), plaintext.as_bytes())
            .map_err(|e| LobbyError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut envelope = STANDARD.encode(iv);
        envelope.push_str(&STANDARD.encode(ciphertext));
        Ok(envelope)
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`LobbyError::DecryptionFailed`] for a wrong passphrase,
    /// tampered data or a malformed envelope. Never returns partial output.
    pub fn decrypt(&self, envelope: &str) -> LobbyResult<String> {
        let (iv, ciphertext) = split_envelope(envelope)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| {
                LobbyError::DecryptionFailed("authentication tag mismatch".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| LobbyError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }
}

/// Split an envelope into its IV and ciphertext+tag bytes
fn split_envelope(envelope: &str) -> LobbyResult<([u8; IV_SIZE], Vec<u8>)> {
    let (iv_b64, ciphertext_b64) = match (envelope.get(..IV_B64_LEN), envelope.get(IV_B64_LEN..)) {
        (Some(iv), Some(rest)) => (iv, rest),
        _ => {
            return Err(LobbyError::DecryptionFailed(format!(
                "envelope shorter than {} characters",
                IV_B64_LEN
            )))
        }
    };

    let iv_bytes = STANDARD
        .decode(iv_b64)
        .map_err(|e| LobbyError::DecryptionFailed(format!("invalid IV encoding: {}", e)))?;
    let iv: [u8; IV_SIZE] = iv_bytes.as_slice().try_into().map_err(|_| {
        let got = iv_bytes.len();
        LobbyError::DecryptionFailed(format!("IV must be {} bytes, got {}", IV_SIZE, got))
    })?;

    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| LobbyError::DecryptionFailed(format!("invalid ciphertext encoding: {}", e)))?;
    if ciphertext.len() < TAG_SIZE {
        return Err(LobbyError::DecryptionFailed(
            "ciphertext shorter than authentication tag".to_string(),
        ));
    }

    Ok((iv, ciphertext))
}

/// Encrypt `plaintext` with a key derived from `passphrase`.
pub fn encrypt(plaintext: &str, passphrase: &str) -> LobbyResult<String> {
    PassphraseCipher::new(passphrase)?.encrypt(plaintext)
}

/// Decrypt an envelope with a key derived from `passphrase`.
pub fn decrypt(envelope: &str, passphrase: &str) -> LobbyResult<String> {
    PassphraseCipher::new(passphrase)?.decrypt(envelope)
}
