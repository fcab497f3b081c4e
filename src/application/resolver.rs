//! Content resolver.
//!
//! Resolves page and section content through a fixed fallback chain:
//! resolution cache, then the remote gateway, then the local durable
//! snapshot, then compiled defaults. Every public read terminates in a usable
//! value; remote and local failures are logged and fallen through, never
//! returned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{CacheConfig, CacheKey, Clock, ResolutionCache};
use crate::domain::change::ChangeEvent;
use crate::domain::content::{ContentSnapshot, PageContent, SectionContent};
use crate::domain::defaults;

use super::gateway::{ChangeFeed, ContentGateway};
use super::local::{LocalSnapshotCache, MutationObserver, StorageChange};
use super::subscribers::{SubscriberRegistry, Subscription};
use super::tasks::TaskSet;

const SOURCE: &str = "application::resolver";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("content resolver has been disposed")]
    Disposed,
}

enum Lifecycle {
    Uninitialized,
    Active(TaskSet),
    Disposed,
}

pub struct ContentResolver {
    gateway: ContentGateway,
    local: LocalSnapshotCache<ContentSnapshot>,
    observer: Option<Arc<dyn MutationObserver>>,
    cache_config: CacheConfig,
    cache: ResolutionCache<Arc<PageContent>>,
    current: RwLock<Arc<ContentSnapshot>>,
    subscribers: SubscriberRegistry<ContentSnapshot>,
    load_gate: Mutex<()>,
    /// Bumped whenever cached pages are reloaded or invalidated.
    generation: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    disposed: AtomicBool,
}

impl ContentResolver {
    pub fn new(
        gateway: ContentGateway,
        local: LocalSnapshotCache<ContentSnapshot>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            gateway,
            local,
            observer: None,
            cache_config: cache_config.clone(),
            cache: ResolutionCache::new("content", cache_config),
            current: RwLock::new(Arc::new(ContentSnapshot::empty())),
            subscribers: SubscriberRegistry::new("content"),
            load_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            disposed: AtomicBool::new(false),
        }
    }

    /// Listen for cross-context writes of the local content key once initialized.
    pub fn with_observer(mut self, observer: Arc<dyn MutationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Evaluate cache expiry against `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = ResolutionCache::with_clock("content", &self.cache_config, clock);
        self
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<ContentSnapshot> {
        rw_read(&self.current, SOURCE, "current").clone()
    }

    /// Register for future snapshots. Nothing is replayed on registration.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<ContentSnapshot>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Bulk-load every active section and publish the result.
    ///
    /// Falls back to the local snapshot, then to an empty snapshot; per-page
    /// defaults are applied by [`ContentResolver::load_page`].
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Arc<ContentSnapshot> {
        let _gate = self.load_gate.lock().await;
        self.bump_generation();

        match self.gateway.fetch_content(None).await {
            Ok(rows) if !rows.is_empty() => {
                let snapshot = Arc::new(ContentSnapshot::from_rows(rows));
                for (page_key, page) in snapshot.pages() {
                    self.cache
                        .set(CacheKey::page(page_key), Arc::new(page.clone()));
                }
                if self.cache_config.write_through {
                    self.local.save(&snapshot);
                }
                info!(
                    pages = snapshot.page_count(),
                    source = "remote",
                    "Content snapshot loaded"
                );
                return self.publish(snapshot);
            }
            Ok(_) => info!("Remote returned no content rows; trying local snapshot"),
            Err(err) => warn!(error = %err, "Remote content fetch failed; trying local snapshot"),
        }

        if let Some(snapshot) = self.local.load().filter(|snapshot| !snapshot.is_empty()) {
            info!(
                pages = snapshot.page_count(),
                source = "local",
                "Content snapshot loaded"
            );
            return self.publish(Arc::new(snapshot));
        }

        warn!("No content from remote or local store; publishing empty snapshot");
        self.publish(Arc::new(ContentSnapshot::empty()))
    }

    /// Resolve one page through cache, remote, local snapshot, then compiled defaults.
    ///
    /// A remote result is cached only if no reload or invalidation started
    /// while it was being fetched.
    #[instrument(skip(self))]
    pub async fn load_page(&self, page_key: &str) -> Arc<PageContent> {
        let key = CacheKey::page(page_key);
        if let Some(page) = self.cache.get(&key) {
            return page;
        }

        let generation = self.generation.load(Ordering::Acquire);
        match self.gateway.fetch_content(Some(page_key)).await {
            Ok(rows) => {
                let page: PageContent = rows
                    .into_iter()
                    .filter(|row| row.page_key == page_key)
                    .map(|row| (row.section_key, row.section_content))
                    .collect();
                if !page.is_empty() {
                    let page = Arc::new(page);
                    let _gate = self.load_gate.lock().await;
                    if self.generation.load(Ordering::Acquire) == generation {
                        self.cache.set(key, page.clone());
                    } else {
                        debug!(page_key, "Content reloaded during page fetch; not caching");
                    }
                    return page;
                }
                debug!(page_key, "Remote has no rows for page; trying local snapshot");
            }
            Err(err) => {
                warn!(page_key, error = %err, "Remote page fetch failed; trying local snapshot");
            }
        }

        if let Some(page) = self
            .local
            .load()
            .and_then(|snapshot| snapshot.page(page_key).cloned())
        {
            debug!(page_key, source = "local", "Page resolved");
            return Arc::new(page);
        }

        debug!(page_key, source = "default", "Page resolved");
        Arc::new(defaults::page(page_key))
    }

    /// Resolve one section; a missing section yields its compiled default or an empty stub.
    pub async fn get_section(&self, page_key: &str, section_key: &str) -> SectionContent {
        let page = self.load_page(page_key).await;
        if let Some(section) = page.section(section_key) {
            return section.clone();
        }
        let fallback = defaults::section(page_key, section_key);
        debug!(
            page_key,
            section_key,
            stub = defaults::is_stub(&fallback),
            "Section missing; serving compiled default"
        );
        fallback
    }

    /// Load content and start listening for remote and cross-context changes.
    ///
    /// Calling this again while active is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> Result<Arc<ContentSnapshot>, ResolverError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Active(_) => return Ok(self.current()),
            Lifecycle::Disposed => return Err(ResolverError::Disposed),
            Lifecycle::Uninitialized => {}
        }

        let snapshot = self.load_all().await;

        let mut tasks = TaskSet::new();
        match self.gateway.subscribe_content().await {
            Ok(feed) => tasks.spawn(listen_remote(Arc::downgrade(self), feed)),
            Err(err) => {
                warn!(error = %err, "Content change feed unavailable; live updates disabled");
            }
        }
        if let Some(observer) = &self.observer {
            tasks.spawn(listen_storage(Arc::downgrade(self), observer.watch()));
        }

        info!(listeners = tasks.len(), "Content resolver initialized");
        *lifecycle = Lifecycle::Active(tasks);
        Ok(snapshot)
    }

    /// Stop listeners and drop cached state and subscribers.
    ///
    /// Loads already in flight complete but their results are not published.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        let mut lifecycle = self.lifecycle.lock().await;
        if let Lifecycle::Active(mut tasks) =
            std::mem::replace(&mut *lifecycle, Lifecycle::Disposed)
        {
            tasks.abort_all();
        }
        self.bump_generation();
        self.cache.invalidate(None);
        self.subscribers.clear();
        info!("Content resolver disposed");
    }

    async fn apply_change(&self, event: &ChangeEvent) {
        self.bump_generation();
        match event.page_key() {
            Some(page_key) => self.cache.invalidate(Some(&CacheKey::page(page_key))),
            None => self.cache.invalidate(None),
        }
        info!(
            table = %event.table,
            operation = %event.operation,
            page_key = event.page_key(),
            "Remote content changed; reloading"
        );
        self.load_all().await;
    }

    async fn apply_storage_change(&self) {
        self.bump_generation();
        self.cache.invalidate(None);
        info!(key = self.local.key(), "Local content snapshot changed; reloading");
        self.load_all().await;
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn publish(&self, snapshot: Arc<ContentSnapshot>) -> Arc<ContentSnapshot> {
        if self.disposed.load(Ordering::Acquire) {
            debug!("Discarding snapshot loaded after dispose");
            return snapshot;
        }
        *rw_write(&self.current, SOURCE, "publish") = snapshot.clone();
        self.subscribers.notify(&snapshot);
        snapshot
    }
}

async fn listen_remote(resolver: Weak<ContentResolver>, mut feed: ChangeFeed) {
    while let Some(event) = feed.next().await {
        let Some(resolver) = resolver.upgrade() else {
            break;
        };
        resolver.apply_change(&event).await;
    }
    debug!(table = feed.table(), "Content change feed closed");
}

async fn listen_storage(
    resolver: Weak<ContentResolver>,
    mut changes: broadcast::Receiver<StorageChange>,
) {
    loop {
        let relevant = match changes.recv().await {
            Ok(change) => resolver
                .upgrade()
                .is_some_and(|resolver| resolver.local.key() == change.key),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Storage change listener lagged; reloading");
                true
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if !relevant {
            continue;
        }
        let Some(resolver) = resolver.upgrade() else {
            break;
        };
        resolver.apply_storage_change().await;
    }
}
