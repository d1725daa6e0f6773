//! Error types for Lobby Link

use thiserror::Error;

/// Main error type for Lobby Link operations
#[derive(Error, Debug)]
pub enum LobbyError {
    /// Root identity could not be resolved (directory miss or lookup failure)
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Decryption failed (wrong passphrase, tampered data, or malformed envelope)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity-related error (keys, signatures)
    #[error("Identity error: {0}")]
    Identity(String),

    /// Invalid DID format
    #[error("Invalid DID format: {0}")]
    InvalidDidFormat(String),

    /// Capability token could not be decoded or verified
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Pub/sub transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error during gossip protocol operations
    #[error("Gossip error: {0}")]
    Gossip(String),

    /// Network-related error (endpoint bind, shutdown)
    #[error("Network error: {0}")]
    Network(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer never answered the heartbeat within the configured timeout
    #[error("Handshake timed out after {0} ms")]
    HandshakeTimeout(u64),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for LobbyError {
    fn from(e: serde_json::Error) -> Self {
        LobbyError::Serialization(e.to_string())
    }
}

/// Result type alias using LobbyError
pub type LobbyResult<T> = Result<T, LobbyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LobbyError::Resolution("_did.alice.fissionuser.net".to_string());
        assert_eq!(
            format!("{}", err),
            "Resolution error: _did.alice.fissionuser.net"
        );

        let err = LobbyError::HandshakeTimeout(5000);
        assert_eq!(format!("{}", err), "Handshake timed out after 5000 ms");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LobbyError = io_err.into();
        assert!(matches!(err, LobbyError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: LobbyError = json_err.into();
        assert!(matches!(err, LobbyError::Serialization(_)));
    }
}
