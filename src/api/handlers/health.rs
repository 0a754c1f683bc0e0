//! Health and metrics handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::IntoResponse, Json};
use once_cell::sync::Lazy;

use crate::metrics;
use crate::models::{HealthResponse, HealthStatus};
use crate::router::RouterState;
use crate::AgentState;

/// Server start time for uptime calculation
static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Agent health check
pub async fn agent_health(State(state): State<Arc<AgentState>>) -> Json<HealthResponse> {
    let units = state.units.unit_count().await;
    let sessions = state.sessions.session_count().await;

    Json(HealthResponse {
        status: HealthStatus::Healthy,
        role: "agent".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: START_TIME.elapsed().as_secs(),
        units: Some(units as u64),
        sessions: Some(sessions as u64),
        agents: None,
    })
}

/// Agent Prometheus metrics; registry gauges are refreshed on scrape
pub async fn agent_metrics(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    metrics::set_registry_sizes(
        state.units.unit_count().await,
        state.sessions.session_count().await,
    );
    metrics::metrics_response()
}

/// Router health check
pub async fn router_health(State(state): State<Arc<RouterState>>) -> Json<HealthResponse> {
    let status = if state.cursor.agents().is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status,
        role: "router".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: START_TIME.elapsed().as_secs(),
        units: None,
        sessions: None,
        agents: Some(state.cursor.agents().to_vec()),
    })
}

pub async fn router_metrics() -> impl IntoResponse {
    metrics::metrics_response()
}
