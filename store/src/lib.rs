//! Two-tier key-value state persistence.
//!
//! The session tier lives in process memory and is gone after a restart; the
//! durable tier is flushed to a JSON file after every write. Reads and writes
//! are best-effort: failures degrade to defaults and are logged, they never
//! propagate to callers.

pub mod keys;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use subwatch_core::StorageError;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Storage tier selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// In-memory, cleared when the process restarts.
    Session,
    /// Backed by a JSON file, survives restarts.
    Durable,
}

/// Change notification delivered to subscribers on every write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub tier: Tier,
    pub key: String,
    /// `Value::Null` after a removal.
    pub value: Value,
}

#[derive(Debug)]
pub struct StateStore {
    session: RwLock<HashMap<String, Value>>,
    durable: RwLock<HashMap<String, Value>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl StateStore {
    /// Opens the store, loading the durable tier from `path`. A missing or
    /// corrupt file starts the durable tier empty.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let durable = match load_file(&path).await {
            Ok(map) => map,
            Err(e) => {
                warn!("failed to load durable state: {e}");
                HashMap::new()
            }
        };
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            session: RwLock::new(HashMap::new()),
            durable: RwLock::new(durable),
            path: Some(path),
            changes,
        }
    }

    /// Store with no backing file, for tests and dry runs.
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            session: RwLock::new(HashMap::new()),
            durable: RwLock::new(HashMap::new()),
            path: None,
            changes,
        }
    }

    /// Reads and decodes a value; any failure degrades to `None`.
    pub async fn get<T: DeserializeOwned>(&self, tier: Tier, key: &str) -> Option<T> {
        let value = {
            let map = self.map(tier).read().await;
            map.get(key)?.clone()
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, "failed to decode stored value: {e}");
                None
            }
        }
    }

    /// Writes a value and notifies subscribers. Durable writes are flushed to
    /// disk best-effort.
    pub async fn set<T: Serialize>(&self, tier: Tier, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, "failed to encode value: {e}");
                return;
            }
        };
        {
            let mut map = self.map(tier).write().await;
            map.insert(key.to_string(), value.clone());
        }
        if tier == Tier::Durable {
            self.flush().await;
        }
        let _ = self.changes.send(ChangeEvent {
            tier,
            key: key.to_string(),
            value,
        });
    }

    pub async fn remove(&self, tier: Tier, key: &str) {
        let removed = {
            let mut map = self.map(tier).write().await;
            map.remove(key).is_some()
        };
        if !removed {
            return;
        }
        if tier == Tier::Durable {
            self.flush().await;
        }
        let _ = self.changes.send(ChangeEvent {
            tier,
            key: key.to_string(),
            value: Value::Null,
        });
    }

    /// Subscribes to change notifications across both tiers.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn map(&self, tier: Tier) -> &RwLock<HashMap<String, Value>> {
        match tier {
            Tier::Session => &self.session,
            Tier::Durable => &self.durable,
        }
    }

    async fn flush(&self) {
        let Some(path) = &self.path else { return };
        let snapshot = {
            let map = self.durable.read().await;
            map.clone()
        };
        if let Err(e) = write_file(path, &snapshot).await {
            warn!("failed to flush durable state: {e}");
        }
    }
}

async fn load_file(path: &Path) -> Result<HashMap<String, Value>, StorageError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "no durable state file yet");
        return Ok(HashMap::new());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::ReadFailed {
            reason: e.to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|_| StorageError::CorruptFile {
        path: path.display().to_string(),
    })
}

async fn write_file(path: &Path, map: &HashMap<String, Value>) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(map).map_err(|e| StorageError::WriteFailed {
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StorageError::WriteFailed {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn durable_values_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("state.json");

        {
            let store = StateStore::open(&path).await;
            store.set(Tier::Durable, keys::LATEST_HIT_TIMESTAMP, &1234i64).await;
        }

        let store = StateStore::open(&path).await;
        assert_eq!(
            store.get::<i64>(Tier::Durable, keys::LATEST_HIT_TIMESTAMP).await,
            Some(1234)
        );
    }

    #[tokio::test]
    async fn session_values_do_not_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("state.json");

        {
            let store = StateStore::open(&path).await;
            store
                .set(Tier::Session, keys::SEEN_SET, &vec!["a".to_string()])
                .await;
        }

        let store = StateStore::open(&path).await;
        assert_eq!(
            store.get::<Vec<String>>(Tier::Session, keys::SEEN_SET).await,
            None
        );
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"definitely not json").await.expect("write");

        let store = StateStore::open(&path).await;
        assert_eq!(store.get::<i64>(Tier::Durable, "anything").await, None);

        // The store stays usable and repairs the file on the next write.
        store.set(Tier::Durable, "anything", &7i64).await;
        assert_eq!(store.get::<i64>(Tier::Durable, "anything").await, Some(7));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let store = StateStore::in_memory();
        assert_eq!(store.get::<String>(Tier::Durable, "nope").await, None);
    }

    #[tokio::test]
    async fn type_mismatch_degrades_to_none() {
        let store = StateStore::in_memory();
        store.set(Tier::Durable, "k", &"a string").await;
        assert_eq!(store.get::<u64>(Tier::Durable, "k").await, None);
    }

    #[tokio::test]
    async fn subscription_delivers_changes() {
        let store = StateStore::in_memory();
        let mut changes = store.subscribe();

        store.set(Tier::Session, keys::SYSTEM_STATUS, &"idle").await;

        let event = changes.recv().await.expect("change event");
        assert_eq!(event.tier, Tier::Session);
        assert_eq!(event.key, keys::SYSTEM_STATUS);
        assert_eq!(event.value, serde_json::json!("idle"));
    }

    #[tokio::test]
    async fn remove_deletes_and_notifies_null() {
        let store = StateStore::in_memory();
        store.set(Tier::Durable, "k", &1i64).await;

        let mut changes = store.subscribe();
        store.remove(Tier::Durable, "k").await;

        assert_eq!(store.get::<i64>(Tier::Durable, "k").await, None);
        let event = changes.recv().await.expect("change event");
        assert_eq!(event.value, Value::Null);
    }

    #[tokio::test]
    async fn removing_a_missing_key_is_silent() {
        let store = StateStore::in_memory();
        let mut changes = store.subscribe();

        store.remove(Tier::Durable, "never-set").await;
        assert!(changes.try_recv().is_err());
    }
}
