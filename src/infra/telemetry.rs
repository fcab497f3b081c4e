use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })?;

    tracing::debug!(
        level = %logging.level,
        format = logging.format.as_str(),
        "Telemetry initialized"
    );
    Ok(())
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vitrine_cache_hit_total",
            Unit::Count,
            "Total number of resolution cache hits."
        );
        describe_counter!(
            "vitrine_cache_miss_total",
            Unit::Count,
            "Total number of resolution cache misses, expired entries included."
        );
        describe_counter!(
            "vitrine_cache_expired_total",
            Unit::Count,
            "Total number of resolution cache entries dropped on read after their TTL."
        );
        describe_counter!(
            "vitrine_cache_evict_total",
            Unit::Count,
            "Total number of resolution cache evictions due to capacity."
        );
        describe_counter!(
            "vitrine_gateway_shape_error_total",
            Unit::Count,
            "Total number of malformed remote rows skipped by the gateway."
        );
        describe_counter!(
            "vitrine_subscriber_panic_total",
            Unit::Count,
            "Total number of subscriber callbacks that panicked during fan-out."
        );
        describe_counter!(
            "vitrine_notify_total",
            Unit::Count,
            "Total number of notifier calls by outcome."
        );
    });
}
