//! Result listeners: structured log lines and Prometheus gauges.

use std::net::SocketAddr;

use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use watchpost::ProbeResult;

pub const ERROR_COUNT_GAUGE: &str = "watchpost_service_error_count";
pub const EXECUTION_TIME_GAUGE: &str = "watchpost_service_session_execution_time";

/// One INFO line per healthy result, one ERROR line per error otherwise
pub fn log_result(result: &ProbeResult) {
    let runtime_ms = result.run_time.as_millis() as u64;

    if result.errors.is_empty() {
        info!(
            service_id = %result.id,
            runtime_ms,
            timeout = result.timeout,
            "run completed without errors"
        );
        return;
    }

    for err in &result.errors {
        error!(
            service_id = %result.id,
            runtime_ms,
            timeout = result.timeout,
            r#type = %err.kind,
            comment = err.comment.as_deref().unwrap_or_default(),
            location = %err.location.map(|l| l.to_string()).unwrap_or_default(),
            "{}",
            err.error
        );
    }
}

/// Error count and session run time in whole milliseconds, per service
pub fn record_metrics(result: &ProbeResult) {
    gauge!(ERROR_COUNT_GAUGE, result.errors.len() as f64, "service_id" => result.id.clone());
    gauge!(
        EXECUTION_TIME_GAUGE,
        result.run_time.as_millis() as f64,
        "service_id" => result.id.clone()
    );
}

/// Serve the scrape endpoint on `listen`; requires a running runtime
pub fn install_prometheus(listen: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(listen).install()?;
    info!(%listen, "Prometheus exporter listening");
    Ok(())
}
