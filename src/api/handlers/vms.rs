//! Unit lifecycle handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::{ApiError, JsonBody};
use crate::models::{CreateVmRequest, ExecRequest, UnitAck, UnitSummary};
use crate::AgentState;

/// Create a unit
pub async fn create_vm(
    State(state): State<Arc<AgentState>>,
    JsonBody(request): JsonBody<CreateVmRequest>,
) -> Result<(StatusCode, Json<UnitAck>), ApiError> {
    // Runs on its own task so a caller hanging up cannot abandon a half-made unit
    let units = state.units.clone();
    let unit = tokio::spawn(async move { units.create(request.name).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(UnitAck::created(unit.name.clone()))))
}

/// List units with live status
pub async fn list_vms(State(state): State<Arc<AgentState>>) -> Json<Vec<UnitSummary>> {
    Json(state.units.list().await)
}

/// Delete a unit
pub async fn delete_vm(
    State(state): State<Arc<AgentState>>,
    Path(name): Path<String>,
) -> Result<Json<UnitAck>, ApiError> {
    let units = state.units.clone();
    let target = name.clone();
    tokio::spawn(async move { units.delete(&target).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(UnitAck::deleted(name)))
}

/// Run a command once inside a unit; the output is returned as plain text
pub async fn exec_vm(
    State(state): State<Arc<AgentState>>,
    Path(name): Path<String>,
    JsonBody(request): JsonBody<ExecRequest>,
) -> Result<String, ApiError> {
    Ok(state.units.exec_once(&name, &request.cmd).await?)
}
