//! Server-side board cache with debounced flush.
//!
//! [`StorageCache`] is the authoritative copy of every board the server has
//! touched: reads fall through to the backing store once, writes land in
//! memory immediately, and a background task flushes dirty entries to the
//! store on a fixed interval.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful saves, and only when the
//! entry has not been updated again since the flush snapshot. This
//! prioritizes durability over duplicate flush attempts: repeated saves are
//! acceptable, silent data loss is not.

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::remote::{RemoteBoardModel, ValidationError};

/// How often the background task flushes dirty boards.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// A failed operation against the backing store.
#[derive(Debug, thiserror::Error)]
#[error("backing store failed for {key}: {reason}")]
pub struct StoreError {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `add_new` was called for a key already in the cache.
    #[error("board {0} is already in the cache")]
    DuplicateKey(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stored record failed the validation boundary.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Durable storage behind the cache, implemented by the hosting server
/// (disk, object store). Records travel as serialized JSON strings.
pub trait BackupStore {
    fn load(&self, key: &str) -> impl Future<Output = Result<String, StoreError>> + Send;
    fn save(&self, key: &str, data: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn all_keys(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}

struct CacheEntry {
    board: RemoteBoardModel,
    /// Bumped on every in-memory update. A flush clears the dirty flag only
    /// when the revision it snapshotted is still current.
    revision: u64,
    dirty: bool,
}

/// In-memory board cache over a [`BackupStore`].
pub struct StorageCache<S: BackupStore> {
    store: S,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: BackupStore> StorageCache<S> {
    pub fn new(store: S) -> Self {
        Self { store, entries: RwLock::new(HashMap::new()) }
    }

    /// The board stored at `key`, loading and validating it from the
    /// backing store on a cold miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the store has no such record or the
    /// record fails validation.
    pub async fn get(&self, key: &str) -> Result<RemoteBoardModel, CacheError> {
        if let Some(entry) = self.entries.read().await.get(key) {
            return Ok(entry.board.clone());
        }
        let raw = self.store.load(key).await?;
        let value = serde_json::from_str(&raw).map_err(ValidationError::Shape)?;
        let board = RemoteBoardModel::parse(value)?;

        let mut entries = self.entries.write().await;
        // Another task may have raced the same cold miss; its copy wins.
        let entry = entries.entry(key.to_string()).or_insert(CacheEntry {
            board,
            revision: 0,
            dirty: false,
        });
        Ok(entry.board.clone())
    }

    /// Write a board into the cache, authoritative immediately. A key not
    /// yet cached is inserted as a fresh record.
    pub async fn update(&self, key: &str, board: RemoteBoardModel) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.board = board;
                entry.revision += 1;
                entry.dirty = true;
            }
            None => {
                entries.insert(
                    key.to_string(),
                    CacheEntry { board, revision: 0, dirty: true },
                );
            }
        }
    }

    /// Insert a board under a key that must not already be cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DuplicateKey`] when the key is already present.
    pub async fn add_new(&self, key: &str, board: RemoteBoardModel) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Err(CacheError::DuplicateKey(key.to_string()));
        }
        entries.insert(
            key.to_string(),
            CacheEntry { board, revision: 0, dirty: true },
        );
        Ok(())
    }

    /// Every known board key: the union of cached and stored keys, sorted.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the key listing.
    pub async fn all_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = self.store.all_keys().await?;
        for key in self.entries.read().await.keys() {
            keys.push(key.clone());
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Flush every dirty board to the backing store once.
    ///
    /// Snapshots dirty entries under the lock, then performs I/O lock-free.
    /// A failed save keeps the dirty flag so the next flush retries it.
    pub async fn flush_once(&self) {
        let snapshot = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, entry)| entry.dirty)
                .map(|(key, entry)| (key.clone(), entry.board.clone(), entry.revision))
                .collect::<Vec<_>>()
        };

        for (key, board, revision) in snapshot {
            let data = match serde_json::to_string(&board) {
                Ok(data) => data,
                Err(e) => {
                    warn!(key = %key, error = %e, "board failed to serialize; skipping flush");
                    continue;
                }
            };
            match self.store.save(&key, &data).await {
                Ok(()) => self.clear_dirty(&key, revision).await,
                Err(e) => {
                    warn!(key = %key, error = %e, "board flush failed; will retry next tick");
                }
            }
        }
    }

    // EDGE: keep the dirty flag if the board was updated again after the
    // flush snapshot.
    async fn clear_dirty(&self, key: &str, flushed_revision: u64) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.revision == flushed_revision {
                entry.dirty = false;
            }
        }
    }
}

/// Spawn the background flush task. Returns a handle for shutdown.
pub fn spawn_flush_task<S>(cache: Arc<StorageCache<S>>, interval: Duration) -> JoinHandle<()>
where
    S: BackupStore + Send + Sync + 'static,
{
    info!(?interval, "board flush task configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            cache.flush_once().await;
        }
    })
}
