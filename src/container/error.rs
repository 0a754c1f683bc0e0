//! Errors of unit and session operations

use thiserror::Error;

/// Failure of a registry operation on the agent
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Caller supplied an invalid or missing field
    #[error("{0}")]
    Validation(String),

    /// Unknown unit or session
    #[error("{0}")]
    NotFound(String),

    /// A unit with this name is already registered
    #[error("{0}")]
    AlreadyExists(String),

    /// The container runtime or the attached stream failed
    #[error("{0}")]
    Runtime(String),
}

impl ContainerError {
    /// Keep the whole context chain so the adapter's message reaches the caller
    pub(crate) fn runtime(err: anyhow::Error) -> Self {
        ContainerError::Runtime(format!("{:#}", err))
    }
}
