//! Root identity resolution
//!
//! The root identity of a pairing session is resolved once and then cached
//! for the life of the resolver. Precedence, first match wins:
//!
//! 1. the cached identity (any name passed later is ignored)
//! 2. a directory lookup of `_did.<name>.<data root domain>`
//! 3. the root issuer of the authorization token stored on this device
//! 4. this device's own identity

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{LobbyError, LobbyResult};
use crate::identity::RootIdentity;
use crate::storage::Storage;
use crate::ucan;

/// Name → identity directory (DNS TXT records in production)
pub trait IdentityDirectory: Send + Sync {
    /// Look up the record stored under `record`, e.g.
    /// `_did.alice.fissionuser.net`. `Ok(None)` means no such record.
    fn lookup(&self, record: &str) -> impl Future<Output = LobbyResult<Option<String>>> + Send;
}

/// Record name holding the identity of `username`
pub fn did_record_name(username: &str, data_root_domain: &str) -> String {
    format!("_did.{}.{}", username, data_root_domain)
}

/// In-memory directory, keyed by full record name
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `username → identity` pairs under one domain
    pub fn from_usernames<I, K, V>(data_root_domain: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let records = entries
            .into_iter()
            .map(|(name, did)| (did_record_name(name.as_ref(), data_root_domain), did.into()))
            .collect();
        Self { records }
    }

    pub fn insert(&mut self, record: impl Into<String>, value: impl Into<String>) {
        self.records.insert(record.into(), value.into());
    }

    /// Add a user under `data_root_domain`
    pub fn with_user(mut self, username: &str, data_root_domain: &str, did: &RootIdentity) -> Self {
        self.insert(did_record_name(username, data_root_domain), did.as_str());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IdentityDirectory for StaticDirectory {
    async fn lookup(&self, record: &str) -> LobbyResult<Option<String>> {
        Ok(self.records.get(record).cloned())
    }
}

/// Resolves the session's root identity and caches it, write-once.
pub struct IdentityResolver<D> {
    directory: D,
    data_root_domain: String,
    storage: Storage,
    local: RootIdentity,
    cache: OnceCell<RootIdentity>,
}

impl<D: IdentityDirectory> IdentityResolver<D> {
    /// # Arguments
    ///
    /// * `directory` - Name lookup used when a peer name is given
    /// * `data_root_domain` - Domain suffix for directory records
    /// * `storage` - Where a stored authorization token may be found
    /// * `local` - This device's own identity, the last resort
    pub fn new(
        directory: D,
        data_root_domain: impl Into<String>,
        storage: Storage,
        local: RootIdentity,
    ) -> Self {
        Self {
            directory,
            data_root_domain: data_root_domain.into(),
            storage,
            local,
            cache: OnceCell::new(),
        }
    }

    /// Resolve the root identity.
    ///
    /// Once any call succeeds, every later call returns that same identity,
    /// whatever `peer_name` it passes. Failures are not cached.
    pub async fn resolve(&self, peer_name: Option<&str>) -> LobbyResult<RootIdentity> {
        if let Some(cached) = self.cache.get() {
            if peer_name.is_some() {
                debug!(root = %cached, ?peer_name, "Returning cached root identity, ignoring name");
            }
            return Ok(cached.clone());
        }

        self.cache
            .get_or_try_init(|| self.resolve_uncached(peer_name))
            .await
            .cloned()
    }

    /// The cached identity, if resolution has happened
    pub fn cached(&self) -> Option<&RootIdentity> {
        self.cache.get()
    }

    async fn resolve_uncached(&self, peer_name: Option<&str>) -> LobbyResult<RootIdentity> {
        if let Some(name) = peer_name {
            let record = did_record_name(name, &self.data_root_domain);
            let value = self
                .directory
                .lookup(&record)
                .await
                .map_err(|e| LobbyError::Resolution(format!("{}: {}", record, e)))?;

            return match value.map(|v| v.trim().to_string()) {
                Some(did) if !did.is_empty() => {
                    info!(%record, root = %did, "Resolved root identity from directory");
                    Ok(RootIdentity::new(did))
                }
                _ => Err(LobbyError::Resolution(format!("No identity record at {}", record))),
            };
        }

        if let Some(token) = self.storage.ucan()? {
            let root = ucan::root_issuer(&token)?;
            info!(root = %root, "Resolved root identity from stored token");
            return Ok(root);
        }

        info!(root = %self.local, "Using device identity as root identity");
        Ok(self.local.clone())
    }
}
