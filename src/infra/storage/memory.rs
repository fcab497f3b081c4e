use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::application::local::{DurableStore, MutationObserver, StorageChange, StoreError};
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "infra::storage::memory";
const CHANGE_BUFFER: usize = 16;

/// Process-local durable store.
///
/// Writes through [`DurableStore::set`] are silent; [`MemoryStore::write_external`]
/// stands in for another execution context and is broadcast to observers.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn write_external(&self, key: &str, value: &str) {
        mutex_lock(&self.entries, SOURCE, "write_external").insert(key.to_string(), value.to_string());
        // No receivers is not an error.
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
        });
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        mutex_lock(&self.entries, SOURCE, "raw").get(key).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(mutex_lock(&self.entries, SOURCE, "get").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        mutex_lock(&self.entries, SOURCE, "set").insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl MutationObserver for MemoryStore {
    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
