//! Logging and Scoring Metrics

use crate::config::{LogFormat, LoggingConfig};
use feature_engine::AlignmentReport;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
}

/// Install the global Prometheus recorder, `None` if one is already set
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    }
}

/// Count a finished scoring request by outcome (`ok` or an error kind)
pub fn record_request(outcome: &'static str, elapsed: Duration) {
    counter!("credit_risk_requests_total", "outcome" => outcome).increment(1);
    histogram!("credit_risk_request_duration_seconds").record(elapsed.as_secs_f64());
}

/// Count scored rows and the cells defaulted while preparing them
pub fn record_batch(report: &AlignmentReport) {
    counter!("credit_risk_rows_scored_total").increment(report.rows as u64);
    counter!("credit_risk_defaulted_cells_total", "reason" => "missing")
        .increment(report.missing_cells as u64);
    counter!("credit_risk_defaulted_cells_total", "reason" => "non_numeric")
        .increment(report.coerced_cells as u64);
    counter!("credit_risk_defaulted_cells_total", "reason" => "unknown_category")
        .increment(report.unknown_categories as u64);
    counter!("credit_risk_dropped_columns_total").increment(report.dropped_columns.len() as u64);
}
