//! Local persistence using redb.
//!
//! Holds the small amount of state a lobby keeps between runs:
//! - the previously used username
//! - the authorization token (UCAN) granted to this device
//! - the device signing key
//! - the transport endpoint secret

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::LobbyError;
use crate::identity::DeviceKeypair;

const SETTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("settings");
const IDENTITY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("identity");

const USED_USERNAME_KEY: &str = "used_username";
const UCAN_KEY: &str = "ucan";
const DEVICE_KEY: &str = "device_key";
const ENDPOINT_SECRET_KEY: &str = "endpoint_secret";

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Open (or create) a database file at `path`, creating parent
    /// directories as needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LobbyError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        Self::init(db)
    }

    /// A throwaway database that lives only in memory
    pub fn in_memory() -> Result<Self, LobbyError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, LobbyError> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
            let _ = write_txn.open_table(IDENTITY_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Settings
    // ═══════════════════════════════════════════════════════════════════════

    fn get_setting(&self, key: &str) -> Result<Option<String>, LobbyError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        let value = table.get(key)?.map(|v| v.value().to_string());
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), LobbyError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_setting(&self, key: &str) -> Result<(), LobbyError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// The username of the last successfully created account
    pub fn used_username(&self) -> Result<Option<String>, LobbyError> {
        self.get_setting(USED_USERNAME_KEY)
    }

    pub fn set_used_username(&self, username: &str) -> Result<(), LobbyError> {
        self.set_setting(USED_USERNAME_KEY, username)
    }

    /// The authorization token granted to this device, if any
    pub fn ucan(&self) -> Result<Option<String>, LobbyError> {
        self.get_setting(UCAN_KEY)
    }

    pub fn set_ucan(&self, token: &str) -> Result<(), LobbyError> {
        self.set_setting(UCAN_KEY, token)
    }

    pub fn clear_ucan(&self) -> Result<(), LobbyError> {
        self.remove_setting(UCAN_KEY)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════

    fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>, LobbyError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn set_secret(&self, key: &str, value: &[u8]) -> Result<(), LobbyError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(IDENTITY_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the device keypair, generating and saving one on first use.
    pub fn load_or_create_device_keypair(&self) -> Result<DeviceKeypair, LobbyError> {
        if let Some(bytes) = self.get_secret(DEVICE_KEY)? {
            return DeviceKeypair::from_slice(&bytes);
        }

        let keypair = DeviceKeypair::generate();
        self.set_secret(DEVICE_KEY, &keypair.to_bytes())?;
        tracing::info!("Generated new device keypair");
        Ok(keypair)
    }

    /// Load the transport endpoint secret, if one was saved
    pub fn endpoint_secret(&self) -> Result<Option<[u8; 32]>, LobbyError> {
        match self.get_secret(ENDPOINT_SECRET_KEY)? {
            Some(bytes) => {
                let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    LobbyError::Storage(format!(
                        "Endpoint secret must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(Some(secret))
            }
            None => Ok(None),
        }
    }

    pub fn save_endpoint_secret(&self, secret: &[u8; 32]) -> Result<(), LobbyError> {
        self.set_secret(ENDPOINT_SECRET_KEY, secret)
    }
}
