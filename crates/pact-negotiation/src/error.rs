// error.rs — What an actor sees when an action fails.
//
// Validation failures carry a message the user can act on. Infrastructure
// failures during the goal write collapse into one generic retry prompt.

use pact_goal::GoalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The request was refused before anything was written.
    #[error("{0}")]
    Rejected(GoalError),

    /// The goal write did not go through; nothing changed.
    #[error("store unavailable, nothing was changed: {0}")]
    Unavailable(GoalError),
}

impl NegotiationError {
    /// Text suitable for showing to the actor.
    pub fn user_message(&self) -> String {
        match self {
            NegotiationError::Rejected(GoalError::InvalidInput { field, .. }) => {
                format!("Please enter a whole number greater than zero for {}.", field)
            }
            NegotiationError::Rejected(GoalError::OutOfRange { field, min, max, .. }) => {
                format!("{} must be between {} and {}.", capitalize(field), min, max)
            }
            NegotiationError::Rejected(GoalError::InvalidState { status, .. }) => {
                format!("This goal is already {}; refresh to see its latest state.", status)
            }
            NegotiationError::Rejected(GoalError::NotFound(_)) => {
                "This goal no longer exists.".to_string()
            }
            NegotiationError::Rejected(other) => other.to_string(),
            NegotiationError::Unavailable(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, NegotiationError::Unavailable(_))
    }
}

impl From<GoalError> for NegotiationError {
    fn from(err: GoalError) -> Self {
        if err.is_validation() {
            NegotiationError::Rejected(err)
        } else {
            NegotiationError::Unavailable(err)
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
