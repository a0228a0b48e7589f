//! Client-side persistence.
//!
//! Two kinds of storage back the session: a durable store that survives
//! restarts (the bearer token) and a tab-scoped store that lives only as long
//! as one sign-in attempt (the PKCE verifier). Both are plain string key/value
//! stores; nothing here interprets the values.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};

/// Durable-store key for the bearer token.
pub const TOKEN_KEY: &str = "kc_access_token";

/// Tab-scoped key for the PKCE verifier.
pub const PKCE_VERIFIER_KEY: &str = "kc_pkce_verifier";

/// Default file name for the durable store within the data directory.
pub const STORE_FILE: &str = "session.json";

// ============================================================================
// KeyValueStore Trait
// ============================================================================

/// String key/value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn KeyValueStore>;

// ============================================================================
// FileStore
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    updated_at: String,
}

/// JSON-file store for values that must survive restarts.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<Option<BTreeMap<String, StoredEntry>>>,
}

impl FileStore {
    /// Store at `<data_dir>/session.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(STORE_FILE))
    }

    /// Store at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<BTreeMap<String, StoredEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("Failed to read store file: {}", e)))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| AuthError::Storage(format!("Failed to parse store file: {}", e)))
    }

    fn write_file(&self, entries: &BTreeMap<String, StoredEntry>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(|e| {
                    AuthError::Storage(format!("Failed to delete store file: {}", e))
                })?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Storage(format!("Failed to create store directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize store: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| AuthError::Storage(format!("Failed to write store file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::Storage(format!("Failed to restrict store file: {}", e)))?;
        }
        Ok(())
    }

    async fn entries(&self) -> Result<BTreeMap<String, StoredEntry>> {
        {
            let cache = self.cache.read().await;
            if let Some(entries) = cache.as_ref() {
                return Ok(entries.clone());
            }
        }
        let entries = self.read_file()?;
        *self.cache.write().await = Some(entries.clone());
        Ok(entries)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().await?.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries().await?;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                updated_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.write_file(&entries)?;
        *self.cache.write().await = Some(entries);
        tracing::debug!(key, path = %self.path.display(), "Stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries().await?;
        if entries.remove(key).is_some() {
            self.write_file(&entries)?;
        }
        *self.cache.write().await = Some(entries);
        Ok(())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store. Used for tab-scoped state and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Owner of the persisted bearer token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: SharedStore,
}

impl SessionStore {
    pub fn new(backend: SharedStore) -> Self {
        Self { backend }
    }

    /// Durable session store under `data_dir`.
    pub fn file(data_dir: &Path) -> Self {
        Self::new(Arc::new(FileStore::new(data_dir)))
    }

    /// Session store that forgets everything on drop.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Persist the token.
    pub async fn set_token(&self, token: &str) -> Result<()> {
        self.backend.set(TOKEN_KEY, token).await
    }

    /// Read the token back; empty values count as absent.
    pub async fn read_token(&self) -> Result<Option<String>> {
        Ok(self
            .backend
            .get(TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty()))
    }

    /// Forget the token.
    pub async fn clear_token(&self) -> Result<()> {
        self.backend.remove(TOKEN_KEY).await
    }
}
