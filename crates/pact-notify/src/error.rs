// error.rs — Error types for the notification exchange.

use pact_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification id does not resolve.
    #[error("notification not found: {0}")]
    NotFound(String),

    /// A non-forced delete of an action-required notification.
    #[error("notification {0} requires action before it can be dismissed")]
    NotClearable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for NotifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => NotifyError::NotFound(id),
            other => NotifyError::StoreUnavailable(other.to_string()),
        }
    }
}
