//! Engine error types

use thiserror::Error;

/// Errors surfaced by the plan submission API.
///
/// Step-level problems (tool failures, unmet dependencies, oracle hiccups)
/// are never reported here; they are recorded on the workflow and show up
/// in its snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow {0} is already executing")]
    AlreadyExecuting(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(workflow_id: impl Into<String>) -> Self {
        EngineError::NotFound(workflow_id.into())
    }

    /// Whether the caller may simply try again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::AlreadyExecuting(_))
    }
}
