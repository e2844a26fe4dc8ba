//! Centralized registry of bot login state
//!
//! The registry is the authoritative record of which bots the client knows
//! about. It's stored as a single JSON document in the SecretStore at key
//! "ftAuthLoginInfo" and mirrored in memory, so reads never touch the store.
//! Every mutation writes the whole document back before the in-memory copy
//! is replaced.
//!
//! Older clients stored a bare `{ "<bot id>": { ... } }` object under the
//! same key. That layout is still read, and is rewritten in the versioned
//! layout on the next mutation.

use crate::session::BotSession;
use crate::storage::{SecretStore, StoreChange};
use crate::types::{AuthRecord, BotDescriptor};
use crate::{BotAuthError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// One bot in the registry document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotEntry {
    pub id: String,
    #[serde(flatten)]
    pub record: AuthRecord,
}

/// The complete registry document
///
/// Bots are kept as a list so insertion order survives a save/load cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryData {
    pub version: u32,
    #[serde(default)]
    pub bots: Vec<BotEntry>,
}

impl Default for RegistryData {
    fn default() -> Self {
        Self {
            version: 1,
            bots: Vec::new(),
        }
    }
}

impl RegistryData {
    /// Collapse entries sharing an id into one
    ///
    /// The first occurrence keeps its position, the last one's record wins.
    fn dedupe(&mut self) {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<BotEntry> = Vec::with_capacity(self.bots.len());
        for entry in self.bots.drain(..) {
            match positions.get(&entry.id) {
                Some(&idx) => {
                    tracing::warn!(
                        bot_id = %entry.id,
                        "Duplicate bot entry in registry, keeping the last one"
                    );
                    unique[idx].record = entry.record;
                }
                None => {
                    positions.insert(entry.id.clone(), unique.len());
                    unique.push(entry);
                }
            }
        }
        self.bots = unique;
    }

    fn find(&self, id: &str) -> Option<&BotEntry> {
        self.bots.iter().find(|e| e.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut BotEntry> {
        self.bots.iter_mut().find(|e| e.id == id)
    }
}

/// Pre-versioning layout: a plain object keyed by bot id
///
/// Deserialized with a visitor so the object's key order is preserved.
struct LegacyRegistry(Vec<BotEntry>);

impl<'de> Deserialize<'de> for LegacyRegistry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LegacyVisitor;

        impl<'de> Visitor<'de> for LegacyVisitor {
            type Value = LegacyRegistry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of bot id to auth record")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut bots = Vec::new();
                while let Some((id, record)) = map.next_entry::<String, AuthRecord>()? {
                    bots.push(BotEntry { id, record });
                }
                Ok(LegacyRegistry(bots))
            }
        }

        deserializer.deserialize_map(LegacyVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRegistry {
    Versioned(RegistryData),
    Legacy(LegacyRegistry),
}

/// Registry of all bots, backed by a SecretStore
pub struct BotRegistry {
    store: Arc<dyn SecretStore>,
    data: RwLock<RegistryData>,
    /// Set once `spawn_sync` runs; own writes are only counted from then on
    syncing: AtomicBool,
    /// Saves whose change notification the sync task has not seen yet
    own_writes: AtomicU64,
}

impl BotRegistry {
    /// Storage key for the registry
    pub const KEY: &'static str = "ftAuthLoginInfo";

    /// Open the registry, loading whatever the store holds
    ///
    /// A store without a registry yields an empty one.
    pub async fn open(store: Arc<dyn SecretStore>) -> Result<Self> {
        let data = Self::load(store.as_ref()).await?;
        tracing::debug!(bots = data.bots.len(), "Opened bot registry");
        Ok(Self {
            store,
            data: RwLock::new(data),
            syncing: AtomicBool::new(false),
            own_writes: AtomicU64::new(0),
        })
    }

    async fn load(store: &dyn SecretStore) -> Result<RegistryData> {
        match store.get(Self::KEY).await? {
            Some(bytes) => Self::parse(&bytes),
            None => Ok(RegistryData::default()),
        }
    }

    fn parse(bytes: &[u8]) -> Result<RegistryData> {
        let stored: StoredRegistry = serde_json::from_slice(bytes).map_err(|e| {
            BotAuthError::storage(format!("Failed to parse registry JSON: {}", e))
        })?;
        let mut data = match stored {
            StoredRegistry::Versioned(data) => data,
            StoredRegistry::Legacy(LegacyRegistry(bots)) => {
                tracing::info!(bots = bots.len(), "Loaded unversioned bot registry");
                RegistryData { version: 1, bots }
            }
        };
        data.dedupe();
        Ok(data)
    }

    async fn save(&self, data: &RegistryData) -> Result<()> {
        let bytes = serde_json::to_vec(data)
            .map_err(|e| BotAuthError::storage(format!("Failed to serialize registry: {}", e)))?;

        let counted = self.syncing.load(Ordering::SeqCst);
        if counted {
            self.own_writes.fetch_add(1, Ordering::SeqCst);
        }
        let result = self.store.set(Self::KEY, &bytes).await;
        if counted && result.is_err() {
            // A failed write announces nothing
            self.take_own_write();
        }
        result
    }

    /// Consume one pending own-write marker, returning whether there was one
    fn take_own_write(&self) -> bool {
        self.own_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Apply `f` to a copy of the document, persist it, then swap it in
    ///
    /// The write lock is held across the store write so saves never interleave.
    async fn mutate<T>(&self, f: impl FnOnce(&mut RegistryData) -> Result<T>) -> Result<T> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.save(&next).await?;
        *guard = next;
        Ok(out)
    }

    /// Re-read the document from the store, replacing the in-memory copy
    pub async fn reload(&self) -> Result<()> {
        let mut guard = self.data.write().await;
        *guard = Self::load(self.store.as_ref()).await?;
        Ok(())
    }

    /// Store change notifications (all keys, not only the registry's)
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    /// Keep the in-memory copy in step with writes made by other store users
    ///
    /// Notifications caused by this registry's own saves are skipped. Run at
    /// most one sync task per registry. The task ends when the store's change
    /// channel closes.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut changes = self.subscribe();
        self.syncing.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key != Self::KEY => continue,
                    Ok(_) if registry.take_own_write() => continue,
                    Ok(_) => {
                        if let Err(e) = registry.reload().await {
                            tracing::warn!("Failed to reload bot registry: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed notifications can't be attributed any more
                        registry.own_writes.store(0, Ordering::SeqCst);
                        if let Err(e) = registry.reload().await {
                            tracing::warn!("Failed to reload bot registry: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Descriptors of every bot, in display order
    ///
    /// Sorted by `sort_id` (missing counts as 0), ties keep insertion order.
    /// Bots without a `sort_id` report their position in the sorted list.
    pub async fn list_descriptors(&self) -> Vec<BotDescriptor> {
        let data = self.data.read().await;
        let mut entries: Vec<&BotEntry> = data.bots.iter().collect();
        entries.sort_by_key(|e| e.record.sort_id.unwrap_or(0));

        entries
            .into_iter()
            .enumerate()
            .map(|(idx, e)| BotDescriptor {
                bot_id: e.id.clone(),
                bot_name: e.record.bot_name.clone(),
                bot_url: e.record.api_url.clone(),
                sort_id: e.record.sort_id.unwrap_or(idx as i64),
            })
            .collect()
    }

    pub async fn list_ids(&self) -> Vec<String> {
        self.data
            .read()
            .await
            .bots
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.data.read().await.find(id).is_some()
    }

    /// Stored record for `id`, whether or not it is logged in
    pub async fn get(&self, id: &str) -> Option<AuthRecord> {
        self.data.read().await.find(id).map(|e| e.record.clone())
    }

    /// Insert or overwrite the record for `id`
    pub async fn set(&self, id: &str, record: AuthRecord) -> Result<()> {
        self.mutate(|data| {
            match data.find_mut(id) {
                Some(entry) => entry.record = record,
                None => data.bots.push(BotEntry {
                    id: id.to_string(),
                    record,
                }),
            }
            Ok(())
        })
        .await
    }

    /// Modify the record for `id` in place
    ///
    /// Fails with `UnknownBot` if there is no such entry.
    pub async fn update<T>(&self, id: &str, f: impl FnOnce(&mut AuthRecord) -> T) -> Result<T> {
        self.mutate(|data| {
            let entry = data
                .find_mut(id)
                .ok_or_else(|| BotAuthError::UnknownBot(id.to_string()))?;
            Ok(f(&mut entry.record))
        })
        .await
    }

    /// Remove the entry for `id`
    ///
    /// Returns true if it existed. Removing a missing entry writes nothing.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        if !self.contains(id).await {
            return Ok(false);
        }
        self.mutate(|data| {
            let before = data.bots.len();
            data.bots.retain(|e| e.id != id);
            Ok(data.bots.len() != before)
        })
        .await
    }

    /// Session accessor for one bot
    pub fn session(
        self: &Arc<Self>,
        bot_id: impl Into<String>,
        client: reqwest::Client,
    ) -> BotSession {
        BotSession::new(bot_id, Arc::clone(self), client)
    }
}
