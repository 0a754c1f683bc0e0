//! HTTP surfaces
//!
//! Two applications share this module:
//! - the host agent API (unit lifecycle, one-shot exec, shell sessions)
//! - the router API in front of a pool of agents

mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::router::RouterState;
use crate::AgentState;

pub use error::ApiError;
pub use extract::JsonBody;

/// Host agent application
pub fn create_agent_app(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::agent_health))
        .route("/metrics", get(handlers::health::agent_metrics))
        // Unit lifecycle
        .route("/create_vm", post(handlers::vms::create_vm))
        .route("/list_vms", get(handlers::vms::list_vms))
        .route("/delete_vm/:name", delete(handlers::vms::delete_vm))
        .route("/exec_vm/:name", post(handlers::vms::exec_vm))
        // Interactive sessions
        .route("/shell_session/:name", post(handlers::shell::open_session))
        .route("/shell_input/:session_id", post(handlers::shell::shell_input))
        .route(
            "/shell_output/:session_id",
            get(handlers::shell::shell_output).post(handlers::shell::shell_output),
        )
        .route("/shell_close/:session_id", post(handlers::shell::shell_close))
        .with_state(state)
}

/// Router application
pub fn create_router_app(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::router_health))
        .route("/metrics", get(handlers::health::router_metrics))
        .route("/create_vm", post(handlers::forward::create_vm))
        .route("/list_all", get(handlers::forward::list_all))
        .route("/delete_vm", post(handlers::forward::delete_vm))
        .route("/exec_vm", post(handlers::forward::exec_vm))
        .route("/shell_session", post(handlers::forward::shell_session))
        .route("/shell_input", post(handlers::forward::shell_input))
        .route("/shell_output", post(handlers::forward::shell_output))
        .route("/shell_close", post(handlers::forward::shell_close))
        .with_state(state)
}
