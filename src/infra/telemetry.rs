use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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

/// Targets kept at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Install the global subscriber. Logs go to stderr; stdout carries results.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(logging.level)).map_err(|err| {
            InfraError::telemetry(format!("invalid default log directives: {err}"))
        })?,
    };

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
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

fn default_directives(level: LevelFilter) -> String {
    let mut directives = level.to_string().to_lowercase();
    if level > LevelFilter::WARN {
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    directives
}

/// Register descriptions for the query cache metrics. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "costboard_query_fresh_hit_total",
            Unit::Count,
            "Fetches answered from data inside the stale window."
        );
        describe_counter!(
            "costboard_query_coalesced_total",
            Unit::Count,
            "Fetches that joined an attempt already in flight."
        );
        describe_counter!(
            "costboard_query_attempt_total",
            Unit::Count,
            "Fetch attempts started against the fetcher."
        );
        describe_counter!(
            "costboard_query_failure_total",
            Unit::Count,
            "Fetch attempts that settled with an error."
        );
        describe_counter!(
            "costboard_query_invalidate_total",
            Unit::Count,
            "Invalidations of a single key or of the whole cache."
        );
        describe_histogram!(
            "costboard_query_attempt_ms",
            Unit::Milliseconds,
            "Fetch attempt latency in milliseconds."
        );
    });
}
