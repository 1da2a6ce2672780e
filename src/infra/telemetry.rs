use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorta_cache_hit_total",
            Unit::Count,
            "Total number of cache hits across all content keys."
        );
        describe_counter!(
            "scorta_cache_miss_total",
            Unit::Count,
            "Total number of cache misses, including store-down degradations."
        );
        describe_counter!(
            "scorta_cache_write_failed_total",
            Unit::Count,
            "Total number of cache write-backs that failed."
        );
        describe_counter!(
            "scorta_views_recorded_total",
            Unit::Count,
            "Total number of view events recorded against counters."
        );
        describe_counter!(
            "scorta_warmed_items_total",
            Unit::Count,
            "Total number of cache entries refreshed by warm runs."
        );
        describe_histogram!(
            "scorta_warm_run_ms",
            Unit::Milliseconds,
            "Full warm run latency in milliseconds."
        );
    });
}
