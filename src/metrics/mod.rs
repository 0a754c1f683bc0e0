//! Prometheus metrics export
//!
//! Counters and gauges for unit and session lifecycle on the agent, and for
//! forwarding on the router.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => warn!(error = %e, "Prometheus recorder not installed"),
    }
}

pub fn record_unit_created() {
    counter!("minicloud_units_created_total").increment(1);
}

pub fn record_unit_deleted() {
    counter!("minicloud_units_deleted_total").increment(1);
}

pub fn record_unit_reaped(status: &str) {
    counter!("minicloud_units_reaped_total", "status" => status.to_string()).increment(1);
}

pub fn record_session_opened() {
    counter!("minicloud_sessions_opened_total").increment(1);
}

pub fn record_session_closed() {
    counter!("minicloud_sessions_closed_total").increment(1);
}

pub fn set_registry_sizes(units: usize, sessions: usize) {
    gauge!("minicloud_units").set(units as f64);
    gauge!("minicloud_sessions").set(sessions as f64);
}

/// Record a router forward to an agent
pub fn record_forward(agent: &str, operation: &'static str, success: bool) {
    counter!(
        "minicloud_forwards_total",
        "agent" => agent.to_string(),
        "operation" => operation
    )
    .increment(1);

    if !success {
        counter!(
            "minicloud_forward_failures_total",
            "agent" => agent.to_string(),
            "operation" => operation
        )
        .increment(1);
    }
}

/// Render the current metrics in Prometheus text format
pub fn render() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Prometheus metrics endpoint response
pub fn metrics_response() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        render(),
    )
}
