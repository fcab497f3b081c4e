//! Settings synchronizer.
//!
//! Loads site-wide settings with the same cache → remote → local → defaults
//! chain as content, overlays them onto the compiled defaults and reflects the
//! result into the document head. Remote changes to the settings table
//! trigger a reload that bypasses the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{CacheConfig, CacheKey, Clock, ResolutionCache};
use crate::domain::settings::SettingsSnapshot;

use super::document::{DocumentHead, head_elements};
use super::gateway::{ChangeFeed, ContentGateway};
use super::local::LocalSnapshotCache;
use super::subscribers::{SubscriberRegistry, Subscription};
use super::tasks::TaskSet;

const SOURCE: &str = "application::settings";

/// Raw settings groups as persisted locally, keyed by group name.
pub type SettingsGroups = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Applied,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loading => "loading",
            SyncState::Applied => "applied",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("settings synchronizer is not initialized")]
    NotInitialized,
    #[error("settings synchronizer has been disposed")]
    Disposed,
}

pub struct SettingsSynchronizer {
    gateway: ContentGateway,
    local: LocalSnapshotCache<SettingsGroups>,
    document: Arc<dyn DocumentHead>,
    cache_config: CacheConfig,
    cache: ResolutionCache<Arc<SettingsSnapshot>>,
    current: RwLock<Arc<SettingsSnapshot>>,
    state: RwLock<SyncState>,
    subscribers: SubscriberRegistry<SettingsSnapshot>,
    load_gate: Mutex<()>,
    listeners: Mutex<Option<TaskSet>>,
    disposed: AtomicBool,
}

impl SettingsSynchronizer {
    pub fn new(
        gateway: ContentGateway,
        local: LocalSnapshotCache<SettingsGroups>,
        document: Arc<dyn DocumentHead>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            gateway,
            local,
            document,
            cache_config: cache_config.clone(),
            cache: ResolutionCache::new("settings", cache_config),
            current: RwLock::new(Arc::new(SettingsSnapshot::default())),
            state: RwLock::new(SyncState::Uninitialized),
            subscribers: SubscriberRegistry::new("settings"),
            load_gate: Mutex::new(()),
            listeners: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = ResolutionCache::with_clock("settings", &self.cache_config, clock);
        self
    }

    pub fn state(&self) -> SyncState {
        *rw_read(&self.state, SOURCE, "state")
    }

    /// Last applied settings; compiled defaults before the first load.
    pub fn current(&self) -> Arc<SettingsSnapshot> {
        rw_read(&self.current, SOURCE, "current").clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<SettingsSnapshot>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Resolve settings through cache, remote, local snapshot, then defaults.
    ///
    /// Does not apply or publish the result.
    pub async fn load(&self) -> Arc<SettingsSnapshot> {
        self.resolve(false).await
    }

    /// Write the current settings into the document head.
    ///
    /// Managed elements are replaced, never duplicated, so repeated calls
    /// leave the head unchanged.
    pub fn apply_settings(&self) {
        let snapshot = self.current();
        let elements = head_elements(&snapshot);
        debug!(elements = elements.len(), "Applying settings to document head");
        self.document.swap_managed(elements);
    }

    /// Load, apply and start listening for remote settings changes.
    ///
    /// Calling this again once initialized returns the current settings.
    pub async fn initialize(self: &Arc<Self>) -> Result<Arc<SettingsSnapshot>, SyncError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SyncError::Disposed);
        }
        let mut listeners = self.listeners.lock().await;
        if listeners.is_some() {
            return Ok(self.current());
        }

        let snapshot = self.refresh(false).await;

        let mut tasks = TaskSet::new();
        match self.gateway.subscribe_settings().await {
            Ok(feed) => tasks.spawn(listen_remote(Arc::downgrade(self), feed)),
            Err(err) => {
                warn!(error = %err, "Settings change feed unavailable; live updates disabled");
            }
        }
        *listeners = Some(tasks);
        info!(state = %self.state(), "Settings synchronizer initialized");
        Ok(snapshot)
    }

    /// Drop the cached settings and load them again from the remote service.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<Arc<SettingsSnapshot>, SyncError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SyncError::Disposed);
        }
        if self.state() == SyncState::Uninitialized {
            return Err(SyncError::NotInitialized);
        }
        self.cache.invalidate(Some(&CacheKey::SiteSettings));
        Ok(self.refresh(true).await)
    }

    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        if let Some(mut tasks) = self.listeners.lock().await.take() {
            tasks.abort_all();
        }
        self.cache.invalidate(None);
        self.subscribers.clear();
        info!("Settings synchronizer disposed");
    }

    async fn refresh(&self, bypass_cache: bool) -> Arc<SettingsSnapshot> {
        let _gate = self.load_gate.lock().await;
        let previous = self.replace_state(SyncState::Loading);

        let snapshot = self.resolve(bypass_cache).await;
        if self.disposed.load(Ordering::Acquire) {
            debug!(state = %previous, "Discarding settings loaded after dispose");
            self.set_state(previous);
            return snapshot;
        }

        *rw_write(&self.current, SOURCE, "refresh") = snapshot.clone();
        self.apply_settings();
        self.set_state(SyncState::Applied);
        self.subscribers.notify(&snapshot);
        snapshot
    }

    async fn resolve(&self, bypass_cache: bool) -> Arc<SettingsSnapshot> {
        if !bypass_cache && let Some(snapshot) = self.cache.get(&CacheKey::SiteSettings) {
            return snapshot;
        }

        match self.gateway.fetch_settings().await {
            Ok(rows) if !rows.is_empty() => {
                let groups: SettingsGroups = rows
                    .into_iter()
                    .map(|row| (row.setting_key, row.setting_value))
                    .collect();
                let snapshot = Arc::new(SettingsSnapshot::from_groups(&groups));
                self.cache.set(CacheKey::SiteSettings, snapshot.clone());
                if self.cache_config.write_through {
                    self.local.save(&groups);
                }
                info!(groups = groups.len(), source = "remote", "Settings loaded");
                return snapshot;
            }
            Ok(_) => info!("Remote returned no settings rows; trying local snapshot"),
            Err(err) => warn!(error = %err, "Remote settings fetch failed; trying local snapshot"),
        }

        if let Some(groups) = self.local.load() {
            info!(groups = groups.len(), source = "local", "Settings loaded");
            return Arc::new(SettingsSnapshot::from_groups(&groups));
        }

        info!(source = "default", "Settings loaded");
        Arc::new(SettingsSnapshot::default())
    }

    fn set_state(&self, state: SyncState) {
        *rw_write(&self.state, SOURCE, "set_state") = state;
    }

    fn replace_state(&self, state: SyncState) -> SyncState {
        std::mem::replace(&mut *rw_write(&self.state, SOURCE, "replace_state"), state)
    }
}

async fn listen_remote(synchronizer: Weak<SettingsSynchronizer>, mut feed: ChangeFeed) {
    while let Some(event) = feed.next().await {
        let Some(synchronizer) = synchronizer.upgrade() else {
            break;
        };
        info!(
            table = %event.table,
            operation = %event.operation,
            "Remote settings changed; reloading"
        );
        if let Err(err) = synchronizer.reload().await {
            debug!(error = %err, "Settings reload skipped");
            break;
        }
    }
    debug!(table = feed.table(), "Settings change feed closed");
}
