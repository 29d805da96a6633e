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
            "dishdash_order_transition_total",
            Unit::Count,
            "Order status requests by outcome (advanced, cancelled, noop, rejected, conflict, compensated, uncompensated, failed)."
        );
        describe_counter!(
            "dishdash_cache_hit_total",
            Unit::Count,
            "Total number of view cache hits."
        );
        describe_counter!(
            "dishdash_cache_miss_total",
            Unit::Count,
            "Total number of view cache misses."
        );
        describe_counter!(
            "dishdash_cache_error_total",
            Unit::Count,
            "Cache store operations that failed and were bypassed."
        );
        describe_counter!(
            "dishdash_cache_invalidated_keys_total",
            Unit::Count,
            "Total number of cache keys removed by invalidation."
        );
        describe_histogram!(
            "dishdash_cache_invalidate_ms",
            Unit::Milliseconds,
            "Invalidation plan latency in milliseconds."
        );
        describe_counter!(
            "dishdash_notification_total",
            Unit::Count,
            "Cancellation notices by dispatcher and result."
        );
    });
}
