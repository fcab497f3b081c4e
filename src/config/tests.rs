use std::collections::HashMap;

use config::FileFormat;
use serde_json::json;

use super::*;

fn from_toml(toml: &str, env: &[(&str, &str)]) -> RawSettings {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(Some(env)),
        )
        .build()
        .expect("build")
        .try_deserialize()
        .expect("deserialize")
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert!(settings.remote.url.is_none());
    assert_eq!(settings.remote.tables(), GatewayTables::default());
    assert_eq!(settings.cache.ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.capacity.get(), 128);
    assert!(settings.cache.write_through);
    assert_eq!(settings.storage.content_key, "portfolio_content");
    assert_eq!(settings.storage.poll_interval, Duration::from_millis(1_000));
    assert_eq!(settings.monitor.notify_delay, Duration::from_secs(1));
    assert_eq!(settings.monitor.rules, vec![WatchRule::default()]);
}

#[test]
fn environment_overrides_file_and_cli_overrides_both() {
    let mut raw = from_toml(
        r#"
        [cache]
        ttl_seconds = 60

        [logging]
        level = "warn"
        "#,
        &[("VITRINE__CACHE__TTL_SECONDS", "120"), ("VITRINE__LOGGING__LEVEL", "info")],
    );
    assert_eq!(Settings::from_raw(raw.clone()).expect("valid").cache.ttl, Duration::from_secs(120));

    raw.apply_runtime_overrides(&RuntimeOverrides {
        log_level: Some("debug".to_string()),
        cache_ttl_seconds: Some(30),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.ttl, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn watch_rules_are_read_from_file() {
    let raw = from_toml(
        r#"
        [monitor]
        notify_delay_ms = 250
        notifier_url = "https://example.supabase.co/functions/v1/notify-subscribers"

        [[monitor.watch]]
        table = "projects"
        field = "visibility"
        target = "public"

        [[monitor.watch]]
        table = "blog_posts"
        field = "status"
        target = "published"
        notify_without_previous = true
        "#,
        &[],
    );
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.monitor.notify_delay, Duration::from_millis(250));
    assert!(settings.monitor.notifier_url.is_some());
    assert_eq!(
        settings.monitor.rules,
        vec![
            WatchRule::new("projects", "visibility", json!("public")),
            WatchRule::new("blog_posts", "status", json!("published")).notify_without_previous(true),
        ]
    );
}

#[test]
fn watch_overrides_apply_only_to_monitor() {
    let mut raw = RawSettings::default();
    raw.apply_watch_overrides(&WatchArgs {
        notify_delay_ms: Some(0),
        notifier_url: Some("http://localhost:54321/functions/v1/notify".to_string()),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.monitor.notify_delay.is_zero());
    assert_eq!(
        settings.monitor.notifier_url.map(|url| url.port()),
        Some(Some(54321))
    );
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl must fail");
    assert!(matches!(err, LoadError::Invalid { key: "cache.ttl_seconds", .. }));
}

#[test]
fn invalid_remote_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.remote.url = Some("not a url".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid url must fail");
    assert!(matches!(err, LoadError::Invalid { key: "remote.url", .. }));
}

#[test]
fn storage_keys_must_be_distinct_and_plain() {
    let mut raw = RawSettings::default();
    raw.storage.settings_key = Some("portfolio_content".to_string());
    assert!(matches!(
        Settings::from_raw(raw).expect_err("duplicate keys"),
        LoadError::Invalid { key: "storage.settings_key", .. }
    ));

    let mut raw = RawSettings::default();
    raw.storage.content_key = Some("../content".to_string());
    assert!(matches!(
        Settings::from_raw(raw).expect_err("path-like key"),
        LoadError::Invalid { key: "storage.content_key", .. }
    ));

    let mut raw = RawSettings::default();
    raw.storage.poll_interval_ms = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).expect_err("zero poll interval"),
        LoadError::Invalid { key: "storage.poll_interval_ms", .. }
    ));
}

#[test]
fn watch_rule_without_target_is_rejected() {
    let raw = from_toml(
        r#"
        [[monitor.watch]]
        table = "blog_posts"
        field = "status"
        "#,
        &[],
    );
    assert!(matches!(
        Settings::from_raw(raw).expect_err("missing target"),
        LoadError::Invalid { key: "monitor.watch.target", .. }
    ));
}

#[test]
fn parse_page_arguments() {
    let args = CliArgs::parse_from(["vitrine", "page", "homepage", "--section", "hero"]);
    match args.command.expect("page command") {
        Command::Page(page) => {
            assert_eq!(page.page, "homepage");
            assert_eq!(page.section.as_deref(), Some("hero"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn global_overrides_follow_subcommands() {
    let args = CliArgs::parse_from([
        "vitrine",
        "watch",
        "--log-level",
        "debug",
        "--monitor-notify-delay-ms",
        "10",
    ]);

    assert_eq!(args.overrides.log_level.as_deref(), Some("debug"));
    match args.command.expect("watch command") {
        Command::Watch(watch) => assert_eq!(watch.notify_delay_ms, Some(10)),
        other => panic!("unexpected command: {other:?}"),
    }
}
