//! Session token storage.
//!
//! A single bearer token per profile, stored under the well-known key `token`.
//! Presence of the token is the only local notion of "logged in"; validity is
//! decided by the server.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use zeroize::Zeroize;

/// Storage key holding the session token.
pub const TOKEN_KEY: &str = "token";

/// Keychain service name used by the keychain backend.
#[cfg(feature = "keychain")]
const SERVICE_NAME: &str = "com.rt3.client";

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain operation failed: {0}")]
    Keychain(String),
}

#[cfg(feature = "keychain")]
impl From<keyring::Error> for TokenStoreError {
    fn from(err: keyring::Error) -> Self {
        TokenStoreError::Keychain(err.to_string())
    }
}

/// Read/write access to the session token.
///
/// `get` never fails: an unreadable backend is reported as "no session".
/// `clear` is idempotent and never fails from the caller's point of view.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;

    fn set(&self, token: &str) -> Result<(), TokenStoreError>;

    fn clear(&self);
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// In-process token store. The token is zeroed when cleared.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        match self.token.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, token: &str) -> Result<(), TokenStoreError> {
        let mut guard = match self.token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ref mut old) = *guard {
            old.zeroize();
        }
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        let mut guard = match self.token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ref mut t) = *guard {
            t.zeroize();
        }
        *guard = None;
    }
}

// ── File ──────────────────────────────────────────────────────────────────────

/// Persistent key-value file holding the token under [`TOKEN_KEY`].
///
/// Unknown keys in the file are left untouched on write.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/rt3/storage.json`, or `./rt3-storage.json` if the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("rt3").join("storage.json"))
            .unwrap_or_else(|| PathBuf::from("rt3-storage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, TokenStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        // `mode` only applies on creation; tighten files left by older writers.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(raw.as_bytes())?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        let _guard = self.guard();
        match self.read_entries() {
            Ok(mut entries) => entries.remove(TOKEN_KEY),
            Err(e) => {
                log::warn!("Failed to read token storage {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<(), TokenStoreError> {
        let _guard = self.guard();
        let mut entries = self.read_entries()?;
        entries.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_entries(&entries)
    }

    fn clear(&self) {
        let _guard = self.guard();
        let entries = match self.read_entries() {
            Ok(mut entries) => {
                if entries.remove(TOKEN_KEY).is_none() {
                    return;
                }
                entries
            }
            Err(e) => {
                log::warn!("Token storage unreadable, resetting it: {}", e);
                BTreeMap::new()
            }
        };
        if let Err(e) = self.write_entries(&entries) {
            log::error!("Failed to clear token in {}: {}", self.path.display(), e);
        }
    }
}

// ── Keychain ──────────────────────────────────────────────────────────────────

/// OS keychain entry holding the token.
#[cfg(feature = "keychain")]
pub struct KeychainTokenStore {
    account: String,
}

#[cfg(feature = "keychain")]
impl KeychainTokenStore {
    pub fn new() -> Self {
        Self {
            account: TOKEN_KEY.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, TokenStoreError> {
        Ok(keyring::Entry::new(SERVICE_NAME, &self.account)?)
    }
}

#[cfg(feature = "keychain")]
impl Default for KeychainTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "keychain")]
impl TokenStore for KeychainTokenStore {
    fn get(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("{}", e);
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) => Some(token),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                log::warn!("Failed to read token from keychain: {}", e);
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<(), TokenStoreError> {
        self.entry()?.set_password(token)?;
        Ok(())
    }

    fn clear(&self) {
        let result = self.entry().and_then(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TokenStoreError::from(e)),
        });
        if let Err(e) = result {
            log::error!("Failed to clear keychain token: {}", e);
        }
    }
}
