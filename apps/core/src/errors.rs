use thiserror::Error;

use crate::models::record::ApplicationStatus;
use crate::slot::ModelRole;

/// Core error type returned across the pipeline, dedup, history, and slot
/// manager boundaries.
///
/// A duplicate verdict is NOT an error — it is a normal `PipelineOutcome`.
/// Everything here carries enough structure for the caller to decide
/// retry vs abandon (see [`CoreError::is_retryable`]).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// History store read/write failure. Dedup fails closed on this:
    /// no inference is attempted if the check cannot be completed.
    #[error("History store error: {0}")]
    History(String),

    /// Model load/unload failure, or the slot manager is gone.
    #[error("Model {role} unavailable: {reason}")]
    ModelUnavailable { role: ModelRole, reason: String },

    /// Queue wait + load + inference exceeded the caller's deadline.
    /// The resident model is NOT torn down on timeout.
    #[error("Request for {role} timed out after {timeout_ms}ms")]
    Timeout { role: ModelRole, timeout_ms: u64 },

    /// The model service executed the request and returned a structured failure.
    #[error("Model {role} inference failed: {reason}")]
    Inference { role: ModelRole, reason: String },

    /// Attempted status change that the state machine forbids.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether retrying the same call later can reasonably succeed.
    /// Resource-class errors are retryable; validation and state-machine
    /// violations are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::History(_)
                | CoreError::ModelUnavailable { .. }
                | CoreError::Timeout { .. }
        )
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::History(e.to_string())
    }
}
