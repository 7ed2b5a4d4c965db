//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const AUTH_FAILED: &str = "blotterd.auth.failed"; // Counter.
pub const AUTH_LOGINS: &str = "blotterd.auth.logins"; // Counter.

pub const REPORTS_CREATED: &str = "blotterd.reports.created"; // Counter.
pub const REPORTS_RESOLVED: &str = "blotterd.reports.resolved"; // Counter.
pub const REPORTS_ARCHIVED: &str = "blotterd.reports.archived"; // Counter.

pub const NOTIFICATIONS_STORED: &str = "blotterd.notifications.stored"; // Counter.
pub const NOTIFICATIONS_PUSHED: &str = "blotterd.notifications.pushed"; // Counter.
pub const PUSH_FAILED: &str = "blotterd.notifications.push_failed"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(AUTH_FAILED, "The number of failed authentication attempts.");
    describe_counter!(AUTH_LOGINS, "The number of successful logins.");

    describe_counter!(REPORTS_CREATED, "The count of blotter reports filed.");
    describe_counter!(REPORTS_RESOLVED, "The count of reports moved to Resolved.");
    describe_counter!(REPORTS_ARCHIVED, "The count of reports archived.");

    describe_counter!(
        NOTIFICATIONS_STORED,
        "The count of notification records persisted."
    );
    describe_counter!(
        NOTIFICATIONS_PUSHED,
        "The count of notifications forwarded to the push gateway."
    );
    describe_counter!(
        PUSH_FAILED,
        "The count of push deliveries that failed after the record was stored."
    );

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
