#![warn(missing_docs)]
//! # session-guard-store
//!
//! ## Purpose
//! Durable storage of the current [`TokenSet`] on top of a scoped string
//! key/value store.
//!
//! ## Responsibilities
//! - Own the persisted key names and their formatting.
//! - Write and clear the three token keys as one all-or-nothing batch.
//! - Provide in-memory and JSON-file storage backends.
//!
//! ## Data flow
//! The auth gateway calls [`TokenStore::save`] after a successful login or
//! refresh and [`TokenStore::clear`] on logout. Startup restore calls
//! [`TokenStore::load`].
//!
//! ## Ownership and lifetimes
//! Backends are shared as `Arc<dyn KeyValueStorage>`; the token store owns no
//! cached copy, so the backend is the single source of persisted truth.
//!
//! ## Error model
//! Backend failures surface as [`StoreError`]. A partial or unparseable record
//! is not an error: it loads as absent and is logged.
//!
//! ## Security and privacy notes
//! Token values are never logged; only fingerprints are.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use session_guard_core::TokenSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Key holding the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Key holding the RFC 3339 access expiry.
pub const EXPIRES_AT_KEY: &str = "tokenExpiresAt";

/// One mutation inside a storage batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageWrite {
    /// Insert or overwrite a key.
    Set {
        /// Storage key.
        key: String,
        /// New value.
        value: String,
    },
    /// Delete a key if present.
    Remove {
        /// Storage key.
        key: String,
    },
}

/// Scoped string key/value store used purely as a durability layer.
pub trait KeyValueStorage: Send + Sync {
    /// Reads one key.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Applies every write in `batch`, or none of them.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the batch; the store
    /// must be unchanged in that case.
    fn write_batch(&self, batch: &[StorageWrite]) -> Result<(), StoreError>;
}

/// Process-local storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory storage lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write_batch(&self, batch: &[StorageWrite]) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory storage lock poisoned".to_string()))?;
        apply_batch(&mut entries, batch);
        Ok(())
    }
}

/// Storage backend persisting one JSON object per file.
///
/// Batches rewrite the whole object through a temporary file and an atomic
/// rename, so readers never observe half of a batch.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStorage {
    /// Creates a backend rooted at `path`. The file is created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(StoreError::Decode),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(StoreError::Io(error)),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_string_pretty(entries).map_err(StoreError::Decode)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| StoreError::Backend("file storage lock poisoned".to_string()))?;
        Ok(self.read_entries()?.get(key).cloned())
    }

    fn write_batch(&self, batch: &[StorageWrite]) -> Result<(), StoreError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| StoreError::Backend("file storage lock poisoned".to_string()))?;
        let mut entries = self.read_entries()?;
        apply_batch(&mut entries, batch);
        self.write_entries(&entries)
    }
}

fn apply_batch(entries: &mut BTreeMap<String, String>, batch: &[StorageWrite]) {
    for write in batch {
        match write {
            StorageWrite::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            StorageWrite::Remove { key } => {
                entries.remove(key);
            }
        }
    }
}

/// Durable holder of the current token set.
///
/// Only the auth gateway writes through this type; everything else reads the
/// cached auth state instead.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    namespace: Option<String>,
}

impl TokenStore {
    /// Creates a token store using unprefixed keys.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            namespace: None,
        }
    }

    /// Creates a token store whose keys are prefixed with `namespace.`.
    pub fn with_namespace(storage: Arc<dyn KeyValueStorage>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            storage,
            namespace: (!namespace.trim().is_empty()).then_some(namespace),
        }
    }

    /// Fully qualified storage key for `name`.
    pub fn key(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{name}"),
            None => name.to_string(),
        }
    }

    /// Persists `tokens`, replacing any previous set.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the batch.
    pub fn save(&self, tokens: &TokenSet) -> Result<(), StoreError> {
        let batch = [
            StorageWrite::Set {
                key: self.key(ACCESS_TOKEN_KEY),
                value: tokens.access_token.clone(),
            },
            StorageWrite::Set {
                key: self.key(REFRESH_TOKEN_KEY),
                value: tokens.refresh_token.clone(),
            },
            StorageWrite::Set {
                key: self.key(EXPIRES_AT_KEY),
                value: tokens
                    .expires_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        ];
        self.storage.write_batch(&batch)?;
        debug!(token = %tokens.fingerprint(), expires_at = %tokens.expires_at, "token set saved");
        Ok(())
    }

    /// Loads the persisted token set.
    ///
    /// Returns `Ok(None)` when no complete, parseable record exists.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read.
    pub fn load(&self) -> Result<Option<TokenSet>, StoreError> {
        let access = self.storage.get(&self.key(ACCESS_TOKEN_KEY))?;
        let refresh = self.storage.get(&self.key(REFRESH_TOKEN_KEY))?;
        let expires = self.storage.get(&self.key(EXPIRES_AT_KEY))?;

        match (access, refresh, expires) {
            (None, None, None) => Ok(None),
            (Some(access), Some(refresh), Some(expires)) => {
                match DateTime::parse_from_rfc3339(&expires) {
                    Ok(parsed) => Ok(Some(TokenSet::new(
                        access,
                        refresh,
                        parsed.with_timezone(&Utc),
                    ))),
                    Err(error) => {
                        warn!(%error, "stored token expiry is not RFC 3339; treating as absent");
                        Ok(None)
                    }
                }
            }
            _ => {
                warn!("stored token record is incomplete; treating as absent");
                Ok(None)
            }
        }
    }

    /// Removes every token key.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the batch.
    pub fn clear(&self) -> Result<(), StoreError> {
        let batch = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY].map(|name| {
            StorageWrite::Remove {
                key: self.key(name),
            }
        });
        self.storage.write_batch(&batch)?;
        debug!("token set cleared");
        Ok(())
    }

    /// Returns `true` when `now` is at or past `tokens.expires_at`.
    pub fn is_expired(tokens: &TokenSet, now: DateTime<Utc>) -> bool {
        tokens.is_expired(now)
    }
}

/// Token storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted JSON is unreadable.
    #[error("storage decode failure: {0}")]
    Decode(serde_json::Error),
    /// Backend-specific failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}
