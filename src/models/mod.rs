//! Data models for minicloud
//!
//! Request/response bodies of the agent and router HTTP surfaces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::runtime::UnitStatus;

// ============================================================================
// Agent Models
// ============================================================================

/// Request to create a unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVmRequest {
    /// Unit name; generated from the current time when absent
    #[serde(default)]
    pub name: Option<String>,
}

/// Listing entry for one registered unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub name: String,
    /// Short container ID
    pub id: String,
    pub status: UnitStatus,
}

/// Request to run a command once inside a unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    #[serde(default = "default_exec_command")]
    pub cmd: String,
}

impl Default for ExecRequest {
    fn default() -> Self {
        Self {
            cmd: default_exec_command(),
        }
    }
}

fn default_exec_command() -> String {
    "/bin/sh".to_string()
}

/// Input line for an interactive session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellInputRequest {
    #[serde(default)]
    pub input: String,
}

/// Reply to a unit lifecycle request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAck {
    pub status: String,
    pub name: String,
}

impl UnitAck {
    pub fn created(name: impl Into<String>) -> Self {
        Self {
            status: "created".to_string(),
            name: name.into(),
        }
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self {
            status: "deleted".to_string(),
            name: name.into(),
        }
    }
}

/// Reply to a session open request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub session_id: Uuid,
    pub status: String,
}

/// Reply to session input/close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAck {
    pub status: String,
}

impl SessionAck {
    pub fn sent() -> Self {
        Self {
            status: "sent".to_string(),
        }
    }

    pub fn closed() -> Self {
        Self {
            status: "closed".to_string(),
        }
    }
}

// ============================================================================
// Router Models
// ============================================================================

/// Body of the named-agent router operations; presence is checked per route
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedAgentRequest {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

/// One agent's contribution to `list_all`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentListing {
    Units(Vec<UnitSummary>),
    Error(String),
}

/// `[{agent_address: listing}]`, in configured agent order
pub type AggregateListing = Vec<BTreeMap<String, AgentListing>>;

// ============================================================================
// Common Models
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub role: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(default)]
    pub units: Option<u64>,
    #[serde(default)]
    pub sessions: Option<u64>,
    #[serde(default)]
    pub agents: Option<Vec<String>>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Structured error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exec_request_defaults_to_shell() {
        let req: ExecRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.cmd, "/bin/sh");
    }

    #[test]
    fn test_agent_listing_shapes() {
        let units = AgentListing::Units(vec![UnitSummary {
            name: "alpha".into(),
            id: "0123456789ab".into(),
            status: UnitStatus::Running,
        }]);
        assert_eq!(
            serde_json::to_value(&units).unwrap(),
            serde_json::json!([{"name": "alpha", "id": "0123456789ab", "status": "running"}])
        );

        let err = AgentListing::Error("Error: connection refused".into());
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!("Error: connection refused")
        );
    }
}
