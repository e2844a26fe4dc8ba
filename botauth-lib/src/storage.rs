//! Persistent key-value storage for credential data
//!
//! Provides a trait-based abstraction over the storage backend.
//! Implementations include:
//! - FileStore: one file per key with restrictive permissions
//! - MemoryStore: process-local map, used by tests and ephemeral clients
//!
//! Every store announces writes and deletes on a broadcast channel so that
//! holders of cached state (the bot registry) can notice external changes.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, RwLock};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that the value stored at `key` changed or was deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// Trait for persistent secret storage operations
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a value
    ///
    /// Returns None if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a value
    ///
    /// Returns Ok(()) even if the key doesn't exist (idempotent).
    async fn delete(&self, key: &str) -> Result<()>;

    /// Receive a [`StoreChange`] for every subsequent set or delete
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

fn change_channel() -> broadcast::Sender<StoreChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

fn notify(changes: &broadcast::Sender<StoreChange>, key: &str) {
    // No receivers is fine
    let _ = changes.send(StoreChange {
        key: key.to_string(),
    });
}

/// File-based storage implementation
///
/// Stores each value in its own file inside `base_path`, named by the
/// base64url encoding of its key.
pub struct FileStore {
    base_path: PathBuf,
    changes: broadcast::Sender<StoreChange>,
}

impl FileStore {
    /// Create a new FileStore at the given path
    ///
    /// The directory will be created if it doesn't exist, with mode 0700.
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&base_path, perms).await?;
        }

        Ok(Self {
            base_path,
            changes: change_channel(),
        })
    }

    fn key_to_filename(&self, key: &str) -> PathBuf {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        self.base_path.join(URL_SAFE_NO_PAD.encode(key.as_bytes()))
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_to_filename(key);

        // Write to temp file first, then rename (atomic on Unix)
        let temp_path = path.with_extension("tmp");
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&temp_path).await?;

        // mode() only applies on creation; a stale temp file keeps its bits
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        file.write_all(value).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &path).await?;
        notify(&self.changes, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_to_filename(key);

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_to_filename(key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        notify(&self.changes, key);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// In-memory storage implementation
///
/// Nothing survives the process. Clones of the map are never handed out.
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            changes: change_channel(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        notify(&self.changes, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.values.write().await.remove(key).is_some() {
            notify(&self.changes, key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
