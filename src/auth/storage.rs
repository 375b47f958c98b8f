//! Key-value backends behind the token store
//!
//! The console splits session state across two scopes:
//!
//! - **Tab-scoped** storage holds `access_token`, `pkce_verifier`,
//!   `oauth_state`, and `post_login_path`.  It lives exactly as long as the
//!   tab (or CLI process) and is never shared.
//! - **Durable** storage holds `refresh_token` only and survives restarts.
//!
//! [`MemoryStorage`] serves as the tab-scoped backend and as a test double
//! for either scope.  [`KeyringStorage`] is the durable backend, persisting
//! each key in the OS native credential store (Keychain on macOS, Secret
//! Service on Linux, Windows Credential Manager on Windows).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AuthError, Result};

/// Synchronous string key-value storage.
///
/// Implementations must be cheap to call; the token store reads from them on
/// every authenticated request.
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`.  Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::storage::{MemoryStorage, Storage};
///
/// let storage = MemoryStorage::new();
/// storage.set("access_token", "abc").unwrap();
/// assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("abc"));
/// storage.remove("access_token").unwrap();
/// assert!(storage.get("access_token").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AuthError::Storage("memory storage lock poisoned".to_string()).into())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringStorage
// ---------------------------------------------------------------------------

/// Durable storage in the OS keyring.
///
/// Every key becomes one keyring entry under a shared service name, so
/// several console installations can coexist by using different services.
///
/// # Examples
///
/// ```no_run
/// use erp_auth::auth::storage::{KeyringStorage, Storage};
///
/// let storage = KeyringStorage::new("erp-auth");
/// storage.set("refresh_token", "r1").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    /// Creates a keyring accessor for `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Returns the keyring service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| AuthError::Keyring(e).into())
    }
}

impl Storage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Keyring(e).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(AuthError::Keyring)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Keyring(e).into()),
        }
    }
}
