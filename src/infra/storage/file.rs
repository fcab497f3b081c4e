//! Directory-backed durable store: one `<key>.json` file per key.
//!
//! Writes made through a handle are recorded as that handle's own; a watcher
//! polling the directory reports every other change to a watched key as a
//! [`StorageChange`], so several processes can share one directory.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::local::{DurableStore, MutationObserver, StorageChange, StoreError};
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "infra::storage::file";
const CHANGE_BUFFER: usize = 16;

/// Last observed state of a key's file; `None` when it does not exist.
type Fingerprint = Option<(SystemTime, u64)>;

#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
    known: Arc<Mutex<HashMap<String, Fingerprint>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            directory,
            known: Arc::new(Mutex::new(HashMap::new())),
            changes,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Poll `keys` every `interval` and broadcast writes this handle did not make.
    ///
    /// The files' current state is the baseline. The watcher stops once the
    /// store is dropped or the returned handle is aborted.
    pub fn spawn_watcher(
        self: &Arc<Self>,
        keys: Vec<String>,
        interval: Duration,
    ) -> Result<JoinHandle<()>, StoreError> {
        {
            let mut known = mutex_lock(&self.known, SOURCE, "baseline");
            for key in &keys {
                let fingerprint = self.fingerprint(key)?;
                known.entry(key.clone()).or_insert(fingerprint);
            }
        }
        debug!(
            directory = %self.directory.display(),
            keys = keys.len(),
            interval_ms = interval.as_millis() as u64,
            "Storage watcher started"
        );
        Ok(tokio::spawn(watch_directory(Arc::downgrade(self), keys, interval)))
    }

    /// Compare `keys` against their last known state, returning the ones changed elsewhere.
    fn scan(&self, keys: &[String]) -> Vec<String> {
        let mut known = mutex_lock(&self.known, SOURCE, "scan");
        let mut changed = Vec::new();
        for key in keys {
            let current = match self.fingerprint(key) {
                Ok(current) => current,
                Err(err) => {
                    warn!(key = %key, error = %err, "Failed to inspect stored snapshot");
                    continue;
                }
            };
            // A key seen for the first time only sets its baseline.
            if let Some(previous) = known.insert(key.clone(), current)
                && previous != current
            {
                changed.push(key.clone());
            }
        }
        changed
    }

    fn fingerprint(&self, key: &str) -> Result<Fingerprint, StoreError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(Some((metadata.modified()?, metadata.len()))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.directory.join(format!("{key}.json")))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        // Held across the rename so a concurrent scan never sees our own write as foreign.
        let mut known = mutex_lock(&self.known, SOURCE, "set");
        fs::rename(&staging, &path)?;
        known.insert(key.to_string(), self.fingerprint(key)?);
        debug!(key, path = %path.display(), bytes = value.len(), "Stored snapshot");
        Ok(())
    }
}

impl MutationObserver for FileStore {
    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

async fn watch_directory(store: Weak<FileStore>, keys: Vec<String>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(store) = store.upgrade() else {
            break;
        };
        for key in store.scan(&keys) {
            debug!(key = %key, "Stored snapshot changed externally");
            // No receivers is not an error.
            let _ = store.changes.send(StorageChange { key });
        }
    }
    debug!("Storage watcher stopped");
}
