//! HTTP client for host agents

use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::{RequestBuilder, Url};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::metrics;
use crate::models::{CreateVmRequest, UnitSummary};

/// Failure to complete a call to an agent
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("{0}")]
    Transport(String),

    #[error("Invalid agent address {0}")]
    InvalidAddress(String),

    #[error("Agent responded with status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        ForwardError::Transport(err.to_string())
    }
}

/// An agent's response, relayed verbatim to the caller
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl AgentReply {
    /// Relay the body as plain text regardless of what the agent declared
    pub fn into_text(mut self) -> Self {
        self.content_type = Some(HeaderValue::from_static("text/plain; charset=utf-8"));
        self
    }
}

impl IntoResponse for AgentReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        match self.content_type {
            Some(value) => {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            None => {
                response.headers_mut().remove(header::CONTENT_TYPE);
            }
        }
        response
    }
}

/// Client used by the router to reach agents
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    forward_timeout: Duration,
    list_timeout: Duration,
    output_timeout: Duration,
}

impl AgentClient {
    pub fn new(config: &RouterConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("minicloud-router/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            forward_timeout: Duration::from_secs(config.forward_timeout_secs),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            output_timeout: Duration::from_secs(config.output_timeout_secs),
        })
    }

    pub async fn create_vm(
        &self,
        agent: &str,
        request: &CreateVmRequest,
    ) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["create_vm"])?;
        let builder = self
            .http
            .post(url)
            .json(request)
            .timeout(self.forward_timeout);
        self.send(agent, "create", builder).await
    }

    /// Fetch one agent's unit listing; any non-success answer is an error
    pub async fn list_vms(&self, agent: &str) -> Result<Vec<UnitSummary>, ForwardError> {
        let url = agent_url(agent, &["list_vms"])?;
        let result = async {
            let response = self.http.get(url).timeout(self.list_timeout).send().await?;
            if !response.status().is_success() {
                return Err(ForwardError::Status(response.status().as_u16()));
            }
            Ok(response.json::<Vec<UnitSummary>>().await?)
        }
        .await;

        metrics::record_forward(agent, "list", result.is_ok());
        if let Err(e) = &result {
            warn!(agent = %agent, error = %e, "Agent listing failed");
        }
        result
    }

    pub async fn delete_vm(&self, agent: &str, name: &str) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["delete_vm", name])?;
        let builder = self.http.delete(url).timeout(self.forward_timeout);
        self.send(agent, "delete", builder).await
    }

    pub async fn exec_vm(
        &self,
        agent: &str,
        name: &str,
        cmd: &str,
    ) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["exec_vm", name])?;
        let builder = self
            .http
            .post(url)
            .json(&json!({ "cmd": cmd }))
            .timeout(self.forward_timeout);
        self.send(agent, "exec", builder).await
    }

    pub async fn open_session(&self, agent: &str, name: &str) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["shell_session", name])?;
        let builder = self.http.post(url).timeout(self.forward_timeout);
        self.send(agent, "shell_session", builder).await
    }

    pub async fn shell_input(
        &self,
        agent: &str,
        session_id: &str,
        input: &str,
    ) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["shell_input", session_id])?;
        let builder = self
            .http
            .post(url)
            .json(&json!({ "input": input }))
            .timeout(self.forward_timeout);
        self.send(agent, "shell_input", builder).await
    }

    pub async fn shell_output(
        &self,
        agent: &str,
        session_id: &str,
    ) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["shell_output", session_id])?;
        let builder = self.http.post(url).timeout(self.output_timeout);
        self.send(agent, "shell_output", builder).await
    }

    pub async fn shell_close(
        &self,
        agent: &str,
        session_id: &str,
    ) -> Result<AgentReply, ForwardError> {
        let url = agent_url(agent, &["shell_close", session_id])?;
        let builder = self.http.post(url).timeout(self.forward_timeout);
        self.send(agent, "shell_close", builder).await
    }

    async fn send(
        &self,
        agent: &str,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<AgentReply, ForwardError> {
        let result = relay(builder).await;
        metrics::record_forward(agent, operation, result.is_ok());

        match &result {
            Ok(reply) => debug!(
                agent = %agent,
                operation,
                status = reply.status.as_u16(),
                "Forwarded to agent"
            ),
            Err(e) => warn!(agent = %agent, operation, error = %e, "Forward to agent failed"),
        }
        result
    }
}

async fn relay(builder: RequestBuilder) -> Result<AgentReply, ForwardError> {
    let response = builder.send().await?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| ForwardError::Transport(e.to_string()))?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
    let body = response.bytes().await?;

    Ok(AgentReply {
        status,
        content_type,
        body,
    })
}

/// Join path segments onto an agent base URL, escaping each segment
fn agent_url(agent: &str, segments: &[&str]) -> Result<Url, ForwardError> {
    let mut url =
        Url::parse(agent).map_err(|_| ForwardError::InvalidAddress(agent.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ForwardError::InvalidAddress(agent.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
