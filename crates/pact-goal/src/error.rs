// error.rs — Error types for the goal lifecycle subsystem.

use pact_store::StoreError;
use thiserror::Error;

/// Errors that can occur during goal lifecycle operations.
///
/// `InvalidInput`, `OutOfRange`, `InvalidState` and `NotFound` are
/// validation outcomes: they are always reported before anything is
/// written. `StoreUnavailable` covers every infrastructure failure.
#[derive(Debug, Error)]
pub enum GoalError {
    /// A count was non-numeric or not a positive integer.
    #[error("{field} must be a positive whole number, got '{value}'")]
    InvalidInput { field: &'static str, value: String },

    /// A count was a positive integer but outside the allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// The goal's current status does not permit the operation.
    #[error("cannot {operation} goal {goal_id} while it is {status}")]
    InvalidState {
        goal_id: String,
        status: String,
        operation: &'static str,
    },

    /// The requested goal was not found.
    #[error("goal not found: {0}")]
    NotFound(String),

    /// The store failed or could not settle a contended write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GoalError {
    /// True for errors that mean "the request was wrong", as opposed to
    /// "try again later".
    pub fn is_validation(&self) -> bool {
        !matches!(self, GoalError::StoreUnavailable(_))
    }
}

impl From<StoreError> for GoalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => GoalError::NotFound(id),
            other => GoalError::StoreUnavailable(other.to_string()),
        }
    }
}

/// A goal event sink failed (non-fatal).
#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
