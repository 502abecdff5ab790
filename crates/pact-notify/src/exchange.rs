// exchange.rs — NotificationExchange: create, list, read, delete, subscribe.
//
// Two deletion modes exist. A user dismissal (`delete` without force) must
// respect the clearable flag. A system retirement happens after a state
// transition already resolved the step, so it ignores the flag, never
// fails, and falls back to a correlated lookup when the id it was given
// does not resolve or names some other notification.
//
// Creation picks the document id up front so the single retry after a
// failed put overwrites rather than duplicates.

use std::sync::Arc;

use pact_store::{
    from_document, subscribe, to_document, Document, DocumentStore, Filter, OrderBy,
};
use serde_json::json;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::notification::{NewNotification, Notification, NotificationKind};

/// Collection holding notification documents.
pub const NOTIFICATIONS: &str = "notifications";

/// Identifies the notification that prompted an action, for retirement.
///
/// `id` is tried first; the correlation fields are the fallback.
#[derive(Debug, Clone)]
pub struct RetireTarget {
    pub id: Option<String>,
    pub addressee: String,
    pub kind: NotificationKind,
    pub goal_id: String,
}

impl RetireTarget {
    pub fn new(
        addressee: impl Into<String>,
        kind: NotificationKind,
        goal_id: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            addressee: addressee.into(),
            kind,
            goal_id: goal_id.into(),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    fn correlation(&self) -> Filter {
        Filter::new()
            .eq("userId", self.addressee.as_str())
            .eq("type", self.kind.as_str())
            .eq("data.goalId", self.goal_id.as_str())
    }
}

pub struct NotificationExchange {
    store: Arc<dyn DocumentStore>,
}

impl NotificationExchange {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store a new unread notification and return its id. A failed write
    /// is retried once before the error is returned.
    pub async fn create(&self, new: NewNotification) -> Result<String, NotifyError> {
        let notification = new.into_notification();
        let mut doc = to_document(&notification)?;
        doc.remove("id");
        let id = Uuid::new_v4().to_string();
        if let Err(e) = self.store.put(NOTIFICATIONS, &id, doc.clone()).await {
            tracing::warn!(
                id = %id,
                kind = %notification.kind,
                "notification write failed, retrying: {}",
                e
            );
            self.store.put(NOTIFICATIONS, &id, doc).await?;
        }
        tracing::debug!(
            id = %id,
            addressee = %notification.user_id,
            kind = %notification.kind,
            clearable = notification.clearable,
            "notification created"
        );
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Notification, NotifyError> {
        let doc = self
            .store
            .get(NOTIFICATIONS, id)
            .await?
            .ok_or_else(|| NotifyError::NotFound(id.to_string()))?;
        Ok(from_document(doc)?)
    }

    /// The addressee's notifications, newest first.
    pub async fn list(&self, addressee: &str) -> Result<Vec<Notification>, NotifyError> {
        let docs = self
            .store
            .query(
                NOTIFICATIONS,
                &Filter::new().eq("userId", addressee),
                Some(&OrderBy::desc("createdAt")),
            )
            .await?;
        Ok(decode(docs))
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), NotifyError> {
        let notification = self.get(id).await?;
        if notification.read {
            return Ok(());
        }
        let mut fields = Document::new();
        fields.insert("read".to_string(), json!(true));
        self.store.update(NOTIFICATIONS, id, fields).await?;
        Ok(())
    }

    /// Remove a notification. Without `force`, an action-required
    /// notification is refused with `NotClearable`.
    pub async fn delete(&self, id: &str, force: bool) -> Result<(), NotifyError> {
        let notification = self.get(id).await?;
        if !force && !notification.clearable {
            return Err(NotifyError::NotClearable(id.to_string()));
        }
        if !self.store.delete(NOTIFICATIONS, id).await? {
            return Err(NotifyError::NotFound(id.to_string()));
        }
        tracing::debug!(id, force, "notification deleted");
        Ok(())
    }

    /// Delete every notification for the addressee, clearable or not.
    pub async fn clear_all(&self, addressee: &str) -> Result<usize, NotifyError> {
        let docs = self
            .store
            .query(NOTIFICATIONS, &Filter::new().eq("userId", addressee), None)
            .await?;
        let mut removed = 0;
        for doc in docs {
            if let Some(id) = doc.get("id").and_then(|v| v.as_str()) {
                if self.store.delete(NOTIFICATIONS, id).await? {
                    removed += 1;
                }
            }
        }
        tracing::info!(addressee, removed, "notifications cleared");
        Ok(removed)
    }

    /// Full snapshot of the addressee's notifications, newest first, once
    /// now and again after every change.
    pub fn subscribe(
        &self,
        addressee: &str,
    ) -> impl Stream<Item = Result<Vec<Notification>, NotifyError>> + Send + 'static {
        subscribe(
            self.store.clone(),
            NOTIFICATIONS,
            Filter::new().eq("userId", addressee),
            Some(OrderBy::desc("createdAt")),
        )
        .map(|snapshot| snapshot.map(decode).map_err(NotifyError::from))
    }

    /// Best-effort force delete of the notification a resolved step left
    /// behind. Tries the primary id, then the correlated lookup. Never
    /// fails; returns how many records were removed.
    pub async fn retire(&self, target: &RetireTarget) -> usize {
        if let Some(id) = &target.id {
            if self.retire_by_id(id, target).await {
                return 1;
            }
        }

        let docs = match self
            .store
            .query(NOTIFICATIONS, &target.correlation(), None)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(
                    goal_id = %target.goal_id,
                    kind = %target.kind,
                    "could not clean up resolved notification: {}",
                    e
                );
                return 0;
            }
        };

        let mut removed = 0;
        for doc in docs {
            let Some(id) = doc.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            match self.store.delete(NOTIFICATIONS, id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(id, "could not clean up resolved notification: {}", e),
            }
        }
        removed
    }

    // Only deletes `id` when it is the notification the target describes.
    async fn retire_by_id(&self, id: &str, target: &RetireTarget) -> bool {
        let doc = match self.store.get(NOTIFICATIONS, id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tracing::debug!(id, "notification id did not resolve, trying correlated lookup");
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    id,
                    "direct notification lookup failed, trying correlated lookup: {}",
                    e
                );
                return false;
            }
        };
        if !target.correlation().matches(&doc) {
            tracing::debug!(
                id,
                goal_id = %target.goal_id,
                kind = %target.kind,
                "notification id names a different notification, trying correlated lookup"
            );
            return false;
        }
        match self.store.delete(NOTIFICATIONS, id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(
                    id,
                    "direct notification delete failed, trying correlated lookup: {}",
                    e
                );
                false
            }
        }
    }
}

fn decode(docs: Vec<Document>) -> Vec<Notification> {
    docs.into_iter()
        .filter_map(|doc| match from_document::<Notification>(doc) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("skipping unreadable notification: {}", e);
                None
            }
        })
        .collect()
}
