//! Account creation and username rules

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::LobbyResult;

/// Shown when the account service refuses to create an account
pub const ACCOUNT_CREATION_FAILED: &str =
    "Unable to create an account, maybe you have one already?";

/// Names that can never be registered
const RESERVED_USERNAMES: &[&str] = &[
    "admin",
    "administrator",
    "api",
    "dashboard",
    "did",
    "fission",
    "help",
    "ipfs",
    "lobby",
    "root",
    "support",
    "ucan",
    "www",
];

/// Details for a new account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
}

/// Outcome of a username check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameAvailability {
    pub available: bool,
    pub valid: bool,
}

/// Remote account registry
pub trait AccountService: Send + Sync {
    /// Whether `username` is still free under `data_root_domain`
    fn is_username_available(
        &self,
        username: &str,
        data_root_domain: &str,
    ) -> impl Future<Output = LobbyResult<bool>> + Send;

    /// Register an account; `Ok(false)` means the service refused
    fn create_account(
        &self,
        account: &NewAccount,
        api_endpoint: &str,
    ) -> impl Future<Output = LobbyResult<bool>> + Send;
}

/// Whether `username` is syntactically acceptable.
///
/// ASCII letters, digits, `-` and `_` only; no leading or trailing `-`, no
/// leading `_`, and not a reserved name (case-insensitive).
pub fn is_username_valid(username: &str) -> bool {
    !username.is_empty()
        && !username.starts_with('-')
        && !username.ends_with('-')
        && !username.starts_with('_')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !RESERVED_USERNAMES.contains(&username.to_ascii_lowercase().as_str())
}

/// In-memory account registry
#[derive(Debug, Clone, Default)]
pub struct LocalAccounts {
    taken: Arc<Mutex<HashSet<String>>>,
}

impl LocalAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where `usernames` are already taken
    pub fn with_taken<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let taken = usernames.into_iter().map(Into::into).collect();
        Self {
            taken: Arc::new(Mutex::new(taken)),
        }
    }

    pub fn is_taken(&self, username: &str) -> bool {
        self.taken.lock().contains(username)
    }
}

impl AccountService for LocalAccounts {
    async fn is_username_available(
        &self,
        username: &str,
        _data_root_domain: &str,
    ) -> LobbyResult<bool> {
        Ok(!self.is_taken(username))
    }

    async fn create_account(&self, account: &NewAccount, _api_endpoint: &str) -> LobbyResult<bool> {
        Ok(self.taken.lock().insert(account.username.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        for name in ["alice", "Bob42", "a-b", "a_b", "x", "a_"] {
            assert!(is_username_valid(name), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_usernames() {
        for name in ["", "-alice", "alice-", "_alice", "al ice", "al.ice", "ålice", "a@b"] {
            assert!(!is_username_valid(name), "{:?} should be invalid", name);
        }
    }

    #[test]
    fn test_reserved_usernames() {
        assert!(!is_username_valid("admin"));
        assert!(!is_username_valid("Fission"));
        assert!(is_username_valid("admin2"));
    }

    #[tokio::test]
    async fn test_local_accounts() {
        let accounts = LocalAccounts::with_taken(["bob"]);
        assert!(!accounts.is_username_available("bob", "fissionuser.net").await.unwrap());
        assert!(accounts.is_username_available("alice", "fissionuser.net").await.unwrap());

        let alice = NewAccount {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };
        assert!(accounts.create_account(&alice, "https://runfission.net").await.unwrap());
        assert!(!accounts.create_account(&alice, "https://runfission.net").await.unwrap());
        assert!(accounts.is_taken("alice"));
    }
}
