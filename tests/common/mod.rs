#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use vitrine::application::gateway::{
    ChangeFeed, ContentGateway, GatewayError, GatewayTables, RemoteDataService, RowQuery,
};
use vitrine::application::local::LocalSnapshotCache;
use vitrine::application::resolver::ContentResolver;
use vitrine::application::settings::SettingsSynchronizer;
use vitrine::cache::CacheConfig;
use vitrine::infra::document::InMemoryDocument;
use vitrine::infra::remote::InMemoryDataService;
use vitrine::infra::storage::MemoryStore;

pub const CONTENT_KEY: &str = "portfolio_content";
pub const SETTINGS_KEY: &str = "portfolio_settings";
pub const CONTENT_TABLE: &str = "site_content";
pub const SETTINGS_TABLE: &str = "site_settings";

pub fn content_row(id: i64, page_key: &str, section_key: &str, content: Value) -> Value {
    json!({
        "id": id,
        "page_key": page_key,
        "section_key": section_key,
        "section_content": content,
        "is_active": true,
    })
}

pub fn settings_row(id: i64, setting_key: &str, value: Value) -> Value {
    json!({
        "id": id,
        "setting_key": setting_key,
        "setting_value": value,
    })
}

pub fn gateway(service: &Arc<InMemoryDataService>) -> ContentGateway {
    ContentGateway::new(service.clone(), GatewayTables::default())
}

pub fn resolver(service: &Arc<InMemoryDataService>, store: &Arc<MemoryStore>) -> ContentResolver {
    ContentResolver::new(
        gateway(service),
        LocalSnapshotCache::new(store.clone(), CONTENT_KEY),
        &CacheConfig::default(),
    )
}

pub fn synchronizer(
    service: &Arc<InMemoryDataService>,
    store: &Arc<MemoryStore>,
    document: &Arc<InMemoryDocument>,
) -> SettingsSynchronizer {
    SettingsSynchronizer::new(
        gateway(service),
        LocalSnapshotCache::new(store.clone(), SETTINGS_KEY),
        document.clone(),
        &CacheConfig::default(),
    )
}

/// Remote service that holds the first matching query after reading its rows.
///
/// The held query returns the rows it read, however the tables change while it waits.
pub struct GatedService {
    inner: Arc<InMemoryDataService>,
    matches: Box<dyn Fn(&RowQuery) -> bool + Send + Sync>,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl GatedService {
    pub fn new(
        inner: Arc<InMemoryDataService>,
        matches: impl Fn(&RowQuery) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            matches: Box::new(matches),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a matching query has read its rows and is being held.
    pub async fn held(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.reached.notified())
            .await
            .expect("gated query never arrived");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RemoteDataService for GatedService {
    async fn query_rows(&self, query: &RowQuery) -> Result<Vec<Value>, GatewayError> {
        let rows = self.inner.query_rows(query).await?;
        if (self.matches)(query) && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(rows)
    }

    async fn subscribe(&self, table: &str) -> Result<ChangeFeed, GatewayError> {
        self.inner.subscribe(table).await
    }
}

/// Next value from `rx`, failing the test if nothing arrives in time.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for value")
        .expect("channel closed")
}

/// Assert nothing arrives on `rx` within a short window.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(outcome.is_err(), "unexpected value: {outcome:?}");
}

/// Poll `condition` until it holds, failing after a bounded number of attempts.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
