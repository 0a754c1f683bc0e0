//! Router handlers forwarding to host agents

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::join_all;
use tracing::info;

use crate::api::{ApiError, JsonBody};
use crate::models::{AgentListing, AggregateListing, CreateVmRequest, NamedAgentRequest};
use crate::router::{RouterState, AGENT_HEADER};

/// Both fields present and non-empty, or a 400 carrying `message`
fn require<'a>(
    server: &'a Option<String>,
    key: &'a Option<String>,
    message: &str,
) -> Result<(&'a str, &'a str), ApiError> {
    match (server.as_deref(), key.as_deref()) {
        (Some(server), Some(key)) if !server.is_empty() && !key.is_empty() => Ok((server, key)),
        _ => Err(ApiError::BadRequest(message.to_string())),
    }
}

const MISSING_NAME: &str = "Missing server or name";
const MISSING_SESSION: &str = "Missing server or session_id";

/// Forward a create to the next agent in rotation
pub async fn create_vm(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<CreateVmRequest>,
) -> Result<Response, ApiError> {
    let agent = state
        .cursor
        .next()
        .ok_or_else(|| ApiError::Internal("No agents configured".to_string()))?;

    info!(agent = %agent, name = ?request.name, "Routing unit creation");
    let reply = state.client.create_vm(agent, &request).await?;

    let mut response = reply.into_response();
    if let Ok(value) = HeaderValue::from_str(agent) {
        response.headers_mut().insert(AGENT_HEADER, value);
    }
    Ok(response)
}

/// Query every agent concurrently; a failing agent only degrades its own entry
pub async fn list_all(State(state): State<Arc<RouterState>>) -> Json<AggregateListing> {
    let listings = join_all(state.cursor.agents().iter().map(|agent| {
        let client = &state.client;
        async move {
            let listing = match client.list_vms(agent).await {
                Ok(units) => AgentListing::Units(units),
                Err(e) => AgentListing::Error(format!("Error: {}", e)),
            };
            BTreeMap::from([(agent.clone(), listing)])
        }
    }))
    .await;

    Json(listings)
}

pub async fn delete_vm(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, name) = require(&request.server, &request.name, MISSING_NAME)?;
    Ok(state.client.delete_vm(server, name).await?.into_response())
}

/// Exec output is relayed as plain text with the agent's status
pub async fn exec_vm(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, name) = require(&request.server, &request.name, MISSING_NAME)?;
    let cmd = request.cmd.as_deref().unwrap_or("/bin/sh");
    Ok(state
        .client
        .exec_vm(server, name, cmd)
        .await?
        .into_text()
        .into_response())
}

pub async fn shell_session(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, name) = require(&request.server, &request.name, MISSING_NAME)?;
    Ok(state.client.open_session(server, name).await?.into_response())
}

pub async fn shell_input(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, session_id) = require(&request.server, &request.session_id, MISSING_SESSION)?;
    let input = request.input.as_deref().unwrap_or_default();
    Ok(state
        .client
        .shell_input(server, session_id, input)
        .await?
        .into_response())
}

pub async fn shell_output(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, session_id) = require(&request.server, &request.session_id, MISSING_SESSION)?;
    Ok(state
        .client
        .shell_output(server, session_id)
        .await?
        .into_text()
        .into_response())
}

pub async fn shell_close(
    State(state): State<Arc<RouterState>>,
    JsonBody(request): JsonBody<NamedAgentRequest>,
) -> Result<Response, ApiError> {
    let (server, session_id) = require(&request.server, &request.session_id, MISSING_SESSION)?;
    Ok(state
        .client
        .shell_close(server, session_id)
        .await?
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{create_agent_app, create_router_app};
    use crate::config::{AgentConfig, RouterConfig};
    use crate::runtime::fake::FakeRuntime;
    use crate::AgentState;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_agent() -> (String, Arc<FakeRuntime>) {
        let runtime = Arc::new(FakeRuntime::new());
        let config = AgentConfig {
            read_poll_timeout_ms: 100,
            ..AgentConfig::default()
        };
        let state = Arc::new(AgentState::new(config, runtime.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_agent_app(state)).await.unwrap();
        });
        (format!("http://{}", addr), runtime)
    }

    async fn dead_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    async fn spawn_router(agents: Vec<String>) -> String {
        let config = RouterConfig {
            agents,
            list_timeout_secs: 2,
            ..RouterConfig::default()
        };
        let state = Arc::new(RouterState::new(config).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router_app(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn post(router: &str, path: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/{}", router, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    fn agent_of(response: &reqwest::Response) -> String {
        response.headers()[AGENT_HEADER].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_list_delete_exec_scenario() {
        let (agent_a, _) = spawn_agent().await;
        let (agent_b, _) = spawn_agent().await;
        let router = spawn_router(vec![agent_a.clone(), agent_b.clone()]).await;

        let created = post(&router, "create_vm", json!({"name": "alpha"})).await;
        assert_eq!(created.status().as_u16(), 201);
        assert_eq!(agent_of(&created), agent_a);
        let body: Value = created.json().await.unwrap();
        assert_eq!(body, json!({"status": "created", "name": "alpha"}));

        let listing: Value = reqwest::get(format!("{}/list_all", router))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing[0][&agent_a][0]["name"], "alpha");
        assert_eq!(listing[0][&agent_a][0]["status"], "running");
        assert_eq!(listing[1][&agent_b], json!([]));

        let deleted = post(
            &router,
            "delete_vm",
            json!({"server": agent_a, "name": "alpha"}),
        )
        .await;
        assert_eq!(deleted.status().as_u16(), 200);
        let body: Value = deleted.json().await.unwrap();
        assert_eq!(body, json!({"status": "deleted", "name": "alpha"}));

        let exec = post(
            &router,
            "exec_vm",
            json!({"server": agent_a, "name": "alpha", "cmd": "pwd"}),
        )
        .await;
        assert_eq!(exec.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_creates_rotate_across_agents() {
        let (agent_a, runtime_a) = spawn_agent().await;
        let (agent_b, runtime_b) = spawn_agent().await;
        let router = spawn_router(vec![agent_a.clone(), agent_b.clone()]).await;

        let mut picks = Vec::new();
        for i in 0..4 {
            let response = post(&router, "create_vm", json!({"name": format!("vm{}", i)})).await;
            assert_eq!(response.status().as_u16(), 201);
            picks.push(agent_of(&response));
        }

        assert_eq!(picks, vec![agent_a.clone(), agent_b.clone(), agent_a, agent_b]);
        assert_eq!(runtime_a.container_count(), 2);
        assert_eq!(runtime_b.container_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_create_still_advances_cursor() {
        let dead = dead_agent().await;
        let (live, _) = spawn_agent().await;
        let router = spawn_router(vec![dead, live.clone()]).await;

        let first = post(&router, "create_vm", json!({"name": "one"})).await;
        assert_eq!(first.status().as_u16(), 500);
        let body: Value = first.json().await.unwrap();
        assert_eq!(body["code"], "TRANSPORT_FAILURE");
        assert!(body["error"].as_str().is_some());

        let second = post(&router, "create_vm", json!({"name": "two"})).await;
        assert_eq!(second.status().as_u16(), 201);
        assert_eq!(agent_of(&second), live);
    }

    #[tokio::test]
    async fn test_list_all_survives_unreachable_agent() {
        let (live, _) = spawn_agent().await;
        let dead = dead_agent().await;
        let router = spawn_router(vec![live.clone(), dead.clone()]).await;

        post(&router, "create_vm", json!({"name": "alpha"})).await;

        let response = reqwest::get(format!("{}/list_all", router)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let listing: Value = response.json().await.unwrap();

        assert_eq!(listing[0][&live][0]["name"], "alpha");
        let error = listing[1][&dead].as_str().unwrap();
        assert!(error.starts_with("Error: "), "{}", error);
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let (agent, runtime) = spawn_agent().await;
        let router = spawn_router(vec![agent.clone()]).await;

        let response = post(&router, "delete_vm", json!({"name": "alpha"})).await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], MISSING_NAME);

        let response = post(&router, "shell_input", json!({"server": agent, "input": "ls"})).await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], MISSING_SESSION);

        let response = post(&router, "exec_vm", json!({"server": "", "name": "alpha"})).await;
        assert_eq!(response.status().as_u16(), 400);

        assert_eq!(runtime.container_count(), 0);
    }

    async fn post_raw(router: &str, path: &str, body: &'static str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/{}", router, path))
            .body(body)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bad_bodies_are_structured_bad_requests() {
        let (agent, runtime) = spawn_agent().await;
        let router = spawn_router(vec![agent.clone()]).await;

        // No body at all
        let response = post_raw(&router, "delete_vm", "").await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");

        // A field of the wrong JSON type
        let response = post(&router, "delete_vm", json!({"server": agent, "name": 5})).await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");

        // JSON without a content type is still read
        let response = post_raw(&router, "shell_close", r#"{"server":"http://x"}"#).await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], MISSING_SESSION);

        // Same treatment on the agent itself
        let response = post_raw(&agent, "create_vm", "").await;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");

        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_session_id_is_not_found() {
        let (agent, _) = spawn_agent().await;
        let router = spawn_router(vec![agent.clone()]).await;

        let response = post(
            &router,
            "shell_output",
            json!({"server": agent, "session_id": "not-a-uuid"}),
        )
        .await;
        assert_eq!(response.status().as_u16(), 404);

        let response = post(
            &router,
            "shell_close",
            json!({"server": agent, "session_id": "not-a-uuid"}),
        )
        .await;
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Session not-a-uuid not found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_exec_relayed_as_text() {
        let (agent, _) = spawn_agent().await;
        let router = spawn_router(vec![agent.clone()]).await;
        post(&router, "create_vm", json!({"name": "alpha"})).await;

        let response = post(
            &router,
            "exec_vm",
            json!({"server": agent, "name": "alpha", "cmd": "pwd"}),
        )
        .await;
        assert_eq!(response.status().as_u16(), 200);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(response.text().await.unwrap(), "/\n");
    }

    #[tokio::test]
    async fn test_shell_session_through_router() {
        let (agent, _) = spawn_agent().await;
        let router = spawn_router(vec![agent.clone()]).await;
        post(&router, "create_vm", json!({"name": "alpha"})).await;

        let opened = post(
            &router,
            "shell_session",
            json!({"server": agent, "name": "alpha"}),
        )
        .await;
        assert_eq!(opened.status().as_u16(), 201);
        let body: Value = opened.json().await.unwrap();
        assert_eq!(body["status"], "active");
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let sent = post(
            &router,
            "shell_input",
            json!({"server": agent, "session_id": session_id, "input": "echo marker-42"}),
        )
        .await;
        assert_eq!(sent.status().as_u16(), 200);
        let body: Value = sent.json().await.unwrap();
        assert_eq!(body, json!({"status": "sent"}));

        let mut collected = String::new();
        for _ in 0..20 {
            let output = post(
                &router,
                "shell_output",
                json!({"server": agent, "session_id": session_id}),
            )
            .await;
            assert_eq!(output.status().as_u16(), 200);
            collected.push_str(&output.text().await.unwrap());
            if collected.contains("\r\nmarker-42\r\n") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(collected.contains("\r\nmarker-42\r\n"), "{:?}", collected);

        let closed = post(
            &router,
            "shell_close",
            json!({"server": agent, "session_id": session_id}),
        )
        .await;
        assert_eq!(closed.status().as_u16(), 200);

        let after = post(
            &router,
            "shell_output",
            json!({"server": agent, "session_id": session_id}),
        )
        .await;
        assert_eq!(after.status().as_u16(), 404);
    }
}
