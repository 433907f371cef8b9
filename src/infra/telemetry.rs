use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Dependencies that log every statement or connection at `info`.
const QUIETED_TARGETS: &[&str] = &["sqlx::query", "hyper_util", "reqwest"];

const COUNTERS: &[(&str, Unit, &str)] = &[
    (
        "teebox_aqi_cache_hit_total",
        Unit::Count,
        "Air-quality reads served from a fresh cached reading.",
    ),
    (
        "teebox_aqi_cache_miss_total",
        Unit::Count,
        "Air-quality reads that required an upstream refresh.",
    ),
    (
        "teebox_aqi_cache_stale_total",
        Unit::Count,
        "Air-quality reads served from an expired reading after upstream failure.",
    ),
    (
        "teebox_aqi_upstream_error_total",
        Unit::Count,
        "Failed upstream air-quality attempts, including retries.",
    ),
    (
        "teebox_related_unavailable_total",
        Unit::Count,
        "Related-item lookups that fell back to an empty result.",
    ),
    (
        "teebox_optimize_bytes_saved_total",
        Unit::Bytes,
        "Bytes removed from object storage by applied image optimization runs.",
    ),
];

/// Install the global subscriber. Logs go to stderr so the image job's report
/// on stdout stays machine readable. `RUST_LOG`, when set, replaces the
/// configured directives.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(logging.level)))
        .map_err(|err| InfraError::telemetry(format!("invalid log directives: {err}")))?;

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
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

/// The configured level for everything, capped at `warn` for chatty
/// dependencies unless the level is already stricter.
fn default_directives(level: LevelFilter) -> String {
    let cap = level.min(LevelFilter::WARN);
    let mut directives = level.to_string().to_lowercase();
    for target in QUIETED_TARGETS {
        directives.push_str(&format!(",{target}={}", cap.to_string().to_lowercase()));
    }
    directives
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, unit, description) in COUNTERS {
            describe_counter!(*name, *unit, *description);
        }
    });
}
