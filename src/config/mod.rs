//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::gateway::GatewayTables;
use crate::application::monitor::{MonitorConfig, WatchRule};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrine";
const ENV_PREFIX: &str = "VITRINE";
const DEFAULT_CONTENT_TABLE: &str = "site_content";
const DEFAULT_SETTINGS_TABLE: &str = "site_settings";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: usize = 128;
const DEFAULT_STORAGE_DIR: &str = ".vitrine";
const DEFAULT_CONTENT_KEY: &str = "portfolio_content";
const DEFAULT_SETTINGS_KEY: &str = "portfolio_settings";
const DEFAULT_STORAGE_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_NOTIFY_DELAY_MS: u64 = 1_000;

/// Command-line arguments for the Vitrine binary.
#[derive(Debug, Parser)]
#[command(name = "vitrine", version, about = "Portfolio content resolution and live sync")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VITRINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve every page and print the snapshot as JSON.
    Content,
    /// Resolve one page, or one section of it, and print it as JSON.
    Page(PageArgs),
    /// Resolve site settings and print the managed document head.
    Head,
    /// Keep content and settings live and monitor watched tables until interrupted.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PageArgs {
    /// Page key, e.g. `homepage`.
    #[arg(value_name = "PAGE")]
    pub page: String,

    /// Only print this section of the page.
    #[arg(long, value_name = "SECTION")]
    pub section: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchArgs {
    /// Override the delay before each notifier call.
    #[arg(long = "monitor-notify-delay-ms", value_name = "MILLIS")]
    pub notify_delay_ms: Option<u64>,

    /// Override the notifier endpoint.
    #[arg(long = "monitor-notifier-url", value_name = "URL")]
    pub notifier_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the remote REST endpoint.
    #[arg(long = "remote-url", value_name = "URL", global = true)]
    pub remote_url: Option<String>,

    /// Override the remote API key.
    #[arg(long = "remote-api-key", env = "VITRINE_REMOTE_API_KEY", value_name = "KEY", global = true)]
    pub remote_api_key: Option<String>,

    /// Override the resolution cache TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the local snapshot directory.
    #[arg(long = "storage-directory", value_name = "PATH", global = true)]
    pub storage_directory: Option<PathBuf>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub remote: RemoteSettings,
    pub cache: CacheSettings,
    pub storage: StorageSettings,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// REST root of the data service; `None` runs against an empty in-memory service.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub content_table: String,
    pub settings_table: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl RemoteSettings {
    pub fn tables(&self) -> GatewayTables {
        GatewayTables {
            content: self.content_table.clone(),
            settings: self.settings_table.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: NonZeroUsize,
    pub write_through: bool,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
    pub content_key: String,
    pub settings_key: String,
    /// How often the directory is checked for writes by other processes.
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub notify_delay: Duration,
    pub notifier_url: Option<Url>,
    pub rules: Vec<WatchRule>,
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            rules: self.rules.clone(),
            notify_delay: self.notify_delay,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let environment = Environment::with_prefix(ENV_PREFIX).separator("__");
    let mut raw = layered(cli.config_file.as_deref(), environment)?;

    raw.apply_runtime_overrides(&cli.overrides);
    if let Some(Command::Watch(args)) = cli.command.as_ref() {
        raw.apply_watch_overrides(args);
    }

    Settings::from_raw(raw)
}

fn layered(config_file: Option<&Path>, environment: Environment) -> Result<RawSettings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    let raw = builder
        .add_source(environment)
        .build()?
        .try_deserialize()?;
    Ok(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    remote: RawRemoteSettings,
    cache: RawCacheSettings,
    storage: RawStorageSettings,
    monitor: RawMonitorSettings,
}

impl RawSettings {
    fn apply_runtime_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.remote_url.as_ref() {
            self.remote.url = Some(url.clone());
        }
        if let Some(key) = overrides.remote_api_key.as_ref() {
            self.remote.api_key = Some(key.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
    }

    fn apply_watch_overrides(&mut self, overrides: &WatchArgs) {
        if let Some(delay) = overrides.notify_delay_ms {
            self.monitor.notify_delay_ms = Some(delay);
        }
        if let Some(url) = overrides.notifier_url.as_ref() {
            self.monitor.notifier_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            remote,
            cache,
            storage,
            monitor,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            remote: build_remote_settings(remote)?,
            cache: build_cache_settings(cache)?,
            storage: build_storage_settings(storage)?,
            monitor: build_monitor_settings(monitor)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let url = match non_blank(remote.url) {
        Some(value) => Some(
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("remote.url", format!("invalid url: {err}")))?,
        ),
        None => None,
    };

    let content_table = table_name(remote.content_table, DEFAULT_CONTENT_TABLE, "remote.content_table")?;
    let settings_table =
        table_name(remote.settings_table, DEFAULT_SETTINGS_TABLE, "remote.settings_table")?;

    let timeout = positive_duration(
        remote.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS),
        Duration::from_secs,
        "remote.timeout_seconds",
    )?;
    let poll_interval = positive_duration(
        remote.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        Duration::from_millis,
        "remote.poll_interval_ms",
    )?;

    Ok(RemoteSettings {
        url,
        api_key: non_blank(remote.api_key),
        content_table,
        settings_table,
        timeout,
        poll_interval,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl = positive_duration(
        cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        Duration::from_secs,
        "cache.ttl_seconds",
    )?;
    let capacity = NonZeroUsize::new(cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        ttl,
        capacity,
        write_through: cache.write_through.unwrap_or(true),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let directory = storage
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.directory", "must not be empty"));
    }

    let content_key = storage_key(storage.content_key, DEFAULT_CONTENT_KEY, "storage.content_key")?;
    let settings_key =
        storage_key(storage.settings_key, DEFAULT_SETTINGS_KEY, "storage.settings_key")?;
    if content_key == settings_key {
        return Err(LoadError::invalid(
            "storage.settings_key",
            "must differ from storage.content_key",
        ));
    }

    let poll_interval = positive_duration(
        storage
            .poll_interval_ms
            .unwrap_or(DEFAULT_STORAGE_POLL_INTERVAL_MS),
        Duration::from_millis,
        "storage.poll_interval_ms",
    )?;

    Ok(StorageSettings {
        directory,
        content_key,
        settings_key,
        poll_interval,
    })
}

fn build_monitor_settings(monitor: RawMonitorSettings) -> Result<MonitorSettings, LoadError> {
    let notify_delay =
        Duration::from_millis(monitor.notify_delay_ms.unwrap_or(DEFAULT_NOTIFY_DELAY_MS));

    let notifier_url = match non_blank(monitor.notifier_url) {
        Some(value) => Some(Url::parse(&value).map_err(|err| {
            LoadError::invalid("monitor.notifier_url", format!("invalid url: {err}"))
        })?),
        None => None,
    };

    let rules = match monitor.watch {
        Some(raw_rules) => raw_rules
            .into_iter()
            .map(build_watch_rule)
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![WatchRule::default()],
    };

    Ok(MonitorSettings {
        notify_delay,
        notifier_url,
        rules,
    })
}

fn build_watch_rule(raw: RawWatchRule) -> Result<WatchRule, LoadError> {
    let table = non_blank(raw.table)
        .ok_or_else(|| LoadError::invalid("monitor.watch.table", "must not be empty"))?;
    let field = non_blank(raw.field)
        .ok_or_else(|| LoadError::invalid("monitor.watch.field", "must not be empty"))?;
    let target = match raw.target {
        Some(Value::Null) | None => {
            return Err(LoadError::invalid("monitor.watch.target", "must be set"));
        }
        Some(target) => target,
    };
    Ok(WatchRule::new(table, field, target)
        .notify_without_previous(raw.notify_without_previous.unwrap_or(false)))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    url: Option<String>,
    api_key: Option<String>,
    content_table: Option<String>,
    settings_table: Option<String>,
    timeout_seconds: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<u64>,
    capacity: Option<usize>,
    write_through: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
    content_key: Option<String>,
    settings_key: Option<String>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMonitorSettings {
    notify_delay_ms: Option<u64>,
    notifier_url: Option<String>,
    watch: Option<Vec<RawWatchRule>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWatchRule {
    table: Option<String>,
    field: Option<String>,
    target: Option<Value>,
    notify_without_previous: Option<bool>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn table_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) => non_blank(Some(value)).ok_or_else(|| LoadError::invalid(key, "must not be empty")),
    }
}

fn storage_key(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let value = table_name(value, default, key)?;
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
    if !valid {
        return Err(LoadError::invalid(
            key,
            "may only contain ASCII letters, digits, `_` and `-`",
        ));
    }
    Ok(value)
}

fn positive_duration(
    value: u64,
    unit: fn(u64) -> Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(unit(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
