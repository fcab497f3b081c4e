//! Durable local cache adapter.
//!
//! Wraps a synchronous string key-value store holding one JSON-serialized
//! snapshot per key. A missing key and an unparseable blob are both reported
//! as a miss; the caller falls through to compiled defaults.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage key `{key}`")]
    InvalidKey { key: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent string key-value store.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// A write to the durable store performed by another execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
}

/// Observes writes made to the durable store from outside this process context.
pub trait MutationObserver: Send + Sync {
    fn watch(&self) -> broadcast::Receiver<StorageChange>;
}

/// Typed view of one snapshot key in a [`DurableStore`].
pub struct LocalSnapshotCache<T> {
    store: Arc<dyn DurableStore>,
    key: String,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> Clone for LocalSnapshotCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            _snapshot: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> LocalSnapshotCache<T> {
    pub fn new(store: Arc<dyn DurableStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _snapshot: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read and decode the stored snapshot.
    pub fn load(&self) -> Option<T> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "Local snapshot not present");
                return None;
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "Local store read failed");
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    key = %self.key,
                    error = %err,
                    bytes = raw.len(),
                    "Local snapshot is corrupt; treating as missing"
                );
                None
            }
        }
    }

    /// Encode and persist `snapshot`. Failures are logged and reported as `false`.
    pub fn save(&self, snapshot: &T) -> bool {
        let encoded = match serde_json::to_string(snapshot) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = %self.key, error = %err, "Failed to encode local snapshot");
                return false;
            }
        };
        match self.store.set(&self.key, &encoded) {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %self.key, error = %err, "Local store write failed");
                false
            }
        }
    }
}
