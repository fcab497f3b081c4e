use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::{
        gateway::{ContentGateway, RemoteDataService},
        local::LocalSnapshotCache,
        monitor::ChangeMonitor,
        resolver::ContentResolver,
        settings::SettingsSynchronizer,
    },
    cache::CacheConfig,
    config::{self, PageArgs},
    infra::{
        document::InMemoryDocument,
        error::InfraError,
        notifier::HttpNotifier,
        remote::{InMemoryDataService, RestDataService, RestOptions},
        storage::FileStore,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Watch(config::WatchArgs::default()));
    let services = Services::build(&settings)?;

    match command {
        config::Command::Content => run_content(&services).await,
        config::Command::Page(args) => run_page(&services, args).await,
        config::Command::Head => run_head(&services).await,
        config::Command::Watch(_) => run_watch(&services, &settings).await,
    }
}

struct Services {
    gateway: ContentGateway,
    store: Arc<FileStore>,
    resolver: Arc<ContentResolver>,
    synchronizer: Arc<SettingsSynchronizer>,
    document: Arc<InMemoryDocument>,
}

impl Services {
    fn build(settings: &config::Settings) -> Result<Self, InfraError> {
        let service: Arc<dyn RemoteDataService> = match &settings.remote.url {
            Some(url) => Arc::new(RestDataService::new(RestOptions {
                base_url: url.clone(),
                api_key: settings.remote.api_key.clone(),
                timeout: settings.remote.timeout,
                poll_interval: settings.remote.poll_interval,
            })?),
            None => {
                warn!("remote.url is not configured; using an empty in-memory data service");
                Arc::new(InMemoryDataService::new())
            }
        };
        let gateway = ContentGateway::new(service, settings.remote.tables());

        let store = Arc::new(FileStore::open(&settings.storage.directory)?);
        let cache_config = CacheConfig::from(&settings.cache);

        let resolver = Arc::new(
            ContentResolver::new(
                gateway.clone(),
                LocalSnapshotCache::new(store.clone(), settings.storage.content_key.as_str()),
                &cache_config,
            )
            .with_observer(store.clone()),
        );

        let document = Arc::new(InMemoryDocument::new());
        let synchronizer = Arc::new(SettingsSynchronizer::new(
            gateway.clone(),
            LocalSnapshotCache::new(store.clone(), settings.storage.settings_key.as_str()),
            document.clone(),
            &cache_config,
        ));

        Ok(Self {
            gateway,
            store,
            resolver,
            synchronizer,
            document,
        })
    }
}

async fn run_content(services: &Services) -> Result<(), InfraError> {
    let snapshot = services.resolver.load_all().await;
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    Ok(())
}

async fn run_page(services: &Services, args: PageArgs) -> Result<(), InfraError> {
    let output = match args.section.as_deref() {
        Some(section) => {
            let content = services.resolver.get_section(&args.page, section).await;
            serde_json::to_string_pretty(&content)?
        }
        None => {
            let page = services.resolver.load_page(&args.page).await;
            serde_json::to_string_pretty(page.as_ref())?
        }
    };
    println!("{output}");
    Ok(())
}

async fn run_head(services: &Services) -> Result<(), InfraError> {
    services.synchronizer.initialize().await?;
    services.synchronizer.dispose().await;
    println!("{}", services.document.render());
    Ok(())
}

async fn run_watch(services: &Services, settings: &config::Settings) -> Result<(), InfraError> {
    let storage_watcher = services.store.spawn_watcher(
        vec![settings.storage.content_key.clone()],
        settings.storage.poll_interval,
    )?;
    services.resolver.initialize().await?;
    services.synchronizer.initialize().await?;

    let content_subscription = services.resolver.subscribe(|snapshot| {
        info!(pages = snapshot.page_count(), "Content snapshot published");
    });
    let settings_subscription = services.synchronizer.subscribe(|snapshot| {
        info!(title = snapshot.document_title(), "Settings applied");
    });

    let monitor = match &settings.monitor.notifier_url {
        Some(url) => {
            let notifier = HttpNotifier::new(
                url.clone(),
                settings.remote.api_key.as_deref(),
                settings.remote.timeout,
            )?;
            let monitor = ChangeMonitor::new(
                services.gateway.clone(),
                Arc::new(notifier),
                settings.monitor.monitor_config(),
            );
            monitor.start_monitoring().await?;
            Some(monitor)
        }
        None => {
            info!("monitor.notifier_url is not configured; change monitoring disabled");
            None
        }
    };

    info!("Watching for changes; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(monitor) = &monitor {
        monitor.stop_monitoring().await;
    }
    content_subscription.unsubscribe();
    settings_subscription.unsubscribe();
    services.synchronizer.dispose().await;
    services.resolver.dispose().await;
    storage_watcher.abort();
    Ok(())
}
