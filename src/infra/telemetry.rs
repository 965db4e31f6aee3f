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

pub const METRIC_UNITS_TOTAL: &str = "docket_units_total";
pub const METRIC_LEASE_SKIPS_TOTAL: &str = "docket_lease_skips_total";
pub const METRIC_COMPILE_PASSES_TOTAL: &str = "docket_compile_passes_total";
pub const METRIC_EMAILS_SENT_TOTAL: &str = "docket_emails_sent_total";
pub const METRIC_UNIT_MS: &str = "docket_unit_ms";

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
            METRIC_UNITS_TOTAL,
            Unit::Count,
            "Units of work run by polling workers and workflow activities, by worker and result."
        );
        describe_counter!(
            METRIC_LEASE_SKIPS_TOTAL,
            Unit::Count,
            "Worker cycles skipped because the execution lease was not acquired."
        );
        describe_counter!(
            METRIC_COMPILE_PASSES_TOTAL,
            Unit::Count,
            "Typesetting compiler passes, by result."
        );
        describe_counter!(
            METRIC_EMAILS_SENT_TOTAL,
            Unit::Count,
            "Outbound emails handed to the mail transport, by kind."
        );
        describe_histogram!(
            METRIC_UNIT_MS,
            Unit::Milliseconds,
            "Latency of one unit of work in milliseconds."
        );
    });
}
