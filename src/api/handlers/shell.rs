//! Interactive shell session handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::api::{ApiError, JsonBody};
use crate::models::{SessionAck, SessionOpened, ShellInputRequest};
use crate::AgentState;

/// An ID that does not parse cannot name a live session
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Session {} not found", raw)))
}

/// Open a shell session on a unit
pub async fn open_session(
    State(state): State<Arc<AgentState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<SessionOpened>), ApiError> {
    let session_id = state.sessions.open(&name).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionOpened {
            session_id,
            status: "active".to_string(),
        }),
    ))
}

/// Send one input line to a session
pub async fn shell_input(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
    JsonBody(request): JsonBody<ShellInputRequest>,
) -> Result<Json<SessionAck>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    state.sessions.write(&session_id, &request.input).await?;
    Ok(Json(SessionAck::sent()))
}

/// Poll a session for output
pub async fn shell_output(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let output = state.sessions.read(&session_id).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    ))
}

/// Close a session
pub async fn shell_close(
    State(state): State<Arc<AgentState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionAck>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    state.sessions.close(&session_id).await?;
    Ok(Json(SessionAck::closed()))
}
