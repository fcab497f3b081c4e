mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use vitrine::application::gateway::{ContentGateway, GatewayTables};
use vitrine::application::local::{DurableStore, LocalSnapshotCache};
use vitrine::application::resolver::ContentResolver;
use vitrine::cache::{CacheConfig, ManualClock};
use vitrine::domain::content::ContentSnapshot;
use vitrine::domain::defaults;
use vitrine::infra::remote::InMemoryDataService;
use vitrine::infra::storage::{FileStore, MemoryStore};

use common::{CONTENT_KEY, CONTENT_TABLE, content_row, recv};

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("serialize")
}

#[tokio::test]
async fn load_page_prefers_remote_over_local() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Remote"}))],
    );
    store
        .set(CONTENT_KEY, r#"{"homepage":{"hero":{"title":"Local"}}}"#)
        .expect("seed local");

    let resolver = common::resolver(&service, &store);
    let page = resolver.load_page("homepage").await;

    assert_eq!(to_json(page.as_ref()), json!({"hero": {"title": "Remote"}}));
}

#[tokio::test]
async fn load_page_falls_back_to_local_snapshot() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.set_failing(true);
    store
        .set(CONTENT_KEY, r#"{"homepage":{"hero":{"title":"X"}}}"#)
        .expect("seed local");

    let resolver = common::resolver(&service, &store);
    let page = resolver.load_page("homepage").await;

    assert_eq!(to_json(page.as_ref()), json!({"hero": {"title": "X"}}));
}

#[tokio::test]
async fn load_page_serves_compiled_defaults_when_every_source_fails() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.set_failing(true);
    store.set(CONTENT_KEY, "{not json").expect("seed corrupt local");

    let resolver = common::resolver(&service, &store);

    assert_eq!(*resolver.load_page("homepage").await, defaults::page("homepage"));
    assert!(resolver.load_page("unknown-page").await.is_empty());
}

#[tokio::test]
async fn get_section_is_never_absent() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Remote"}))],
    );
    let resolver = common::resolver(&service, &store);

    let hero = resolver.get_section("homepage", "hero").await;
    assert_eq!(hero.get("title"), Some(&json!("Remote")));

    let cta = resolver.get_section("homepage", "cta").await;
    assert_eq!(cta, defaults::section("homepage", "cta"));
    assert!(!cta.is_empty());

    let stub = resolver.get_section("unknown-page", "anything").await;
    assert!(stub.is_empty());
    assert!(defaults::is_stub(&stub));
}

#[tokio::test]
async fn cached_pages_skip_the_remote_until_expiry() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "about", "story", json!({"body": "v1"}))],
    );
    let clock = ManualClock::default();
    let resolver = common::resolver(&service, &store).with_clock(Arc::new(clock.clone()));

    resolver.load_page("about").await;
    resolver.load_page("about").await;
    assert_eq!(service.query_count(), 1);

    clock.advance(Duration::from_secs(5 * 60) - Duration::from_millis(1));
    resolver.load_page("about").await;
    assert_eq!(service.query_count(), 1);

    clock.advance(Duration::from_millis(2));
    resolver.load_page("about").await;
    assert_eq!(service.query_count(), 2);
}

#[tokio::test]
async fn load_all_skips_malformed_rows_and_writes_through() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![
            content_row(1, "homepage", "hero", json!({"title": "Hello"})),
            json!({"id": 2, "page_key": "homepage", "section_content": {}, "is_active": true}),
            json!({"id": 3, "page_key": "about", "section_key": "story", "section_content": 42, "is_active": true}),
        ],
    );
    let resolver = common::resolver(&service, &store);

    let snapshot = resolver.load_all().await;

    assert_eq!(snapshot.page_count(), 1);
    assert_eq!(resolver.current(), snapshot);
    let persisted: ContentSnapshot =
        serde_json::from_str(&store.raw(CONTENT_KEY).expect("written through")).expect("decode");
    assert_eq!(persisted, *snapshot);
}

#[tokio::test]
async fn load_all_returns_empty_snapshot_without_sources() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.set_failing(true);
    let resolver = common::resolver(&service, &store);

    assert!(resolver.load_all().await.is_empty());
}

#[tokio::test]
async fn subscribers_receive_new_snapshots_without_replay() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Hello"}))],
    );
    let resolver = common::resolver(&service, &store);
    resolver.load_all().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = resolver.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.page_count());
    });
    assert!(rx.try_recv().is_err());

    resolver.load_all().await;
    assert_eq!(recv(&mut rx).await, 1);

    assert!(subscription.unsubscribe());
    assert!(!subscription.unsubscribe());
    resolver.load_all().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn remote_changes_reach_subscribers() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Before"}))],
    );
    let resolver = Arc::new(common::resolver(&service, &store));
    resolver.initialize().await.expect("initialize");
    assert_eq!(
        resolver.load_page("homepage").await.section("hero").and_then(|s| s.get("title")),
        Some(&json!("Before"))
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = resolver.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.clone());
    });

    assert!(service.update(
        CONTENT_TABLE,
        content_row(1, "homepage", "hero", json!({"title": "After"})),
    ));

    let snapshot = recv(&mut rx).await;
    let title = snapshot
        .page("homepage")
        .and_then(|page| page.section("hero"))
        .and_then(|section| section.get("title"))
        .cloned();
    assert_eq!(title, Some(json!("After")));
    assert_eq!(
        resolver.get_section("homepage", "hero").await.get("title"),
        Some(&json!("After"))
    );
}

#[tokio::test]
async fn external_local_writes_trigger_reload() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.set_failing(true);
    let resolver = Arc::new(common::resolver(&service, &store).with_observer(store.clone()));
    assert!(resolver.initialize().await.expect("initialize").is_empty());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = resolver.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.clone());
    });

    store.write_external("unrelated_key", "{}");
    store.write_external(CONTENT_KEY, r#"{"blog":{"hero":{"title":"From another tab"}}}"#);

    let snapshot = recv(&mut rx).await;
    assert!(snapshot.page("blog").is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn initialize_is_idempotent_and_dispose_stops_updates() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Hello"}))],
    );
    let resolver = Arc::new(common::resolver(&service, &store));

    resolver.initialize().await.expect("first initialize");
    resolver.initialize().await.expect("second initialize");
    assert_eq!(service.subscriber_count(CONTENT_TABLE), 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = resolver.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.page_count());
    });

    resolver.dispose().await;
    service.insert(
        CONTENT_TABLE,
        content_row(2, "about", "story", json!({"body": "late"})),
    );
    common::assert_silent(&mut rx).await;
    common::wait_until(|| service.subscriber_count(CONTENT_TABLE) == 0).await;
    assert!(resolver.initialize().await.is_err());
}

#[tokio::test]
async fn slow_page_fetch_does_not_overwrite_a_newer_reload() {
    let service = Arc::new(InMemoryDataService::new());
    let store = Arc::new(MemoryStore::new());
    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "Old"}))],
    );
    let gated = Arc::new(common::GatedService::new(service.clone(), |query| {
        query.filters.iter().any(|(column, _)| column == "page_key")
    }));
    let resolver = Arc::new(ContentResolver::new(
        ContentGateway::new(gated.clone(), GatewayTables::default()),
        LocalSnapshotCache::new(store.clone(), CONTENT_KEY),
        &CacheConfig::default(),
    ));

    gated.arm();
    let slow = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.load_page("homepage").await }
    });
    gated.held().await;

    service.seed(
        CONTENT_TABLE,
        vec![content_row(1, "homepage", "hero", json!({"title": "New"}))],
    );
    resolver.load_all().await;
    gated.release();

    let stale = slow.await.expect("page task");
    assert_eq!(to_json(stale.as_ref()), json!({"hero": {"title": "Old"}}));

    let hero = resolver.get_section("homepage", "hero").await;
    assert_eq!(hero.get("title"), Some(&json!("New")));
}

#[tokio::test]
async fn write_from_another_file_store_handle_is_republished() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = Arc::new(InMemoryDataService::new());
    let ours = Arc::new(FileStore::open(dir.path()).expect("open store"));
    let theirs = FileStore::open(dir.path()).expect("open second handle");

    let resolver = Arc::new(
        ContentResolver::new(
            common::gateway(&service),
            LocalSnapshotCache::new(ours.clone(), CONTENT_KEY),
            &CacheConfig::default(),
        )
        .with_observer(ours.clone()),
    );
    let watcher = ours
        .spawn_watcher(vec![CONTENT_KEY.to_string()], Duration::from_millis(10))
        .expect("spawn watcher");
    let initial = resolver.initialize().await.expect("initialize");
    assert!(initial.is_empty());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = resolver.subscribe(move |snapshot| {
        let _ = tx.send(to_json(snapshot.as_ref()));
    });

    theirs
        .set(CONTENT_KEY, r#"{"homepage":{"hero":{"title":"Other process"}}}"#)
        .expect("foreign write");

    assert_eq!(
        recv(&mut rx).await,
        json!({"homepage": {"hero": {"title": "Other process"}}})
    );
    let hero = resolver.get_section("homepage", "hero").await;
    assert_eq!(hero.get("title"), Some(&json!("Other process")));

    resolver.dispose().await;
    watcher.abort();
}
