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

/// Dependencies whose info-level chatter drowns out job logs.
const QUIET_TARGETS: &[&str] = &[
    "sqlx=warn",
    "aws_config=warn",
    "aws_smithy_runtime=warn",
    "hyper=warn",
];

/// Install the global subscriber for `role` (`serve` or `worker`).
pub fn init(logging: &LoggingSettings, role: &'static str) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = build_filter(logging)?;

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_names(role == "worker")
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })?;

    tracing::info!(
        target = "pressroom::telemetry",
        role,
        level = %logging.level,
        "Logging initialised"
    );
    Ok(())
}

fn build_filter(logging: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    for directive in QUIET_TARGETS {
        let parsed = directive.parse().map_err(|err| {
            InfraError::telemetry(format!("invalid log directive `{directive}`: {err}"))
        })?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pressroom_jobs_submitted_total",
            Unit::Count,
            "Total number of conversion jobs accepted and enqueued."
        );
        describe_counter!(
            "pressroom_jobs_completed_total",
            Unit::Count,
            "Total number of conversion jobs finished, labelled by final status."
        );
        describe_histogram!(
            "pressroom_conversion_ms",
            Unit::Milliseconds,
            "Converter run time in milliseconds."
        );
        describe_histogram!(
            "pressroom_upload_ms",
            Unit::Milliseconds,
            "Artifact upload latency in milliseconds."
        );
    });
}
