// names.rs — Display names for notification text.
//
// Name lookup never blocks a transition: any failure degrades to a
// placeholder.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use thiserror::Error;

/// Shown when a user's name cannot be resolved.
pub const UNKNOWN_NAME: &str = "Someone";

#[derive(Debug, Error)]
pub enum NameError {
    #[error("unknown user: {0}")]
    Unknown(String),

    #[error("name lookup unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn user_name(&self, user_id: &str) -> Result<String, NameError>;
}

/// Resolve a display name, falling back to [`UNKNOWN_NAME`].
pub async fn display_name(resolver: &dyn NameResolver, user_id: &str) -> String {
    match resolver.user_name(user_id).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => UNKNOWN_NAME.to_string(),
        Err(e) => {
            tracing::warn!(user_id, "name lookup failed, using placeholder: {}", e);
            UNKNOWN_NAME.to_string()
        }
    }
}

/// In-memory name table, loaded from the `[users]` section of the config.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    names: HashMap<String, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(user_id.into(), name.into());
        self
    }
}

impl From<&BTreeMap<String, String>> for Directory {
    fn from(users: &BTreeMap<String, String>) -> Self {
        Self {
            names: users.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[async_trait]
impl NameResolver for Directory {
    async fn user_name(&self, user_id: &str) -> Result<String, NameError> {
        self.names
            .get(user_id)
            .cloned()
            .ok_or_else(|| NameError::Unknown(user_id.to_string()))
    }
}
