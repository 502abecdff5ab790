// store.rs — DocumentStore trait and the snapshot subscription built on it.
//
// The trait is the only coupling between the negotiation core and whatever
// actually persists documents. Backends publish a DocumentChange after every
// successful write; `subscribe` turns that feed into a stream of full query
// snapshots, which is all the UI layer and the deadline checker need.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::document::{Document, DocumentChange, Filter, OrderBy};
use crate::error::StoreError;

/// Key-addressed document storage.
///
/// All methods are suspension points: callers must assume every one of
/// them is a network round trip that can fail with
/// [`StoreError::Unavailable`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents in `collection` matching `filter`, optionally sorted.
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Create or replace a document. The `id` field is set to `id`.
    async fn put(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;

    /// Create a document under a fresh store-assigned id.
    async fn insert(&self, collection: &str, fields: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, fields).await?;
        Ok(id)
    }

    /// Partial merge into an existing document (`null` removes a field).
    /// Fails with `NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document)
        -> Result<(), StoreError>;

    /// Compare-and-set: merge `fields` only if the current document matches
    /// `guard`. Returns `Ok(false)` without writing when it does not.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &Filter,
        fields: Document,
    ) -> Result<bool, StoreError>;

    /// Remove a document. Returns whether anything was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Receiver for the change feed. Only writes after this call are seen.
    fn changes(&self) -> broadcast::Receiver<DocumentChange>;
}

/// Long-lived feed of full query snapshots.
///
/// Yields the current result set immediately, then a fresh one after every
/// change in `collection` that alters it. A lagging receiver simply
/// re-queries, so no change is ever reported as an error. Drop the stream
/// to unsubscribe.
pub fn subscribe(
    store: Arc<dyn DocumentStore>,
    collection: impl Into<String>,
    filter: Filter,
    order: Option<OrderBy>,
) -> impl Stream<Item = Result<Vec<Document>, StoreError>> + Send + 'static {
    let collection = collection.into();
    // Subscribe before the first query so no write can slip between them.
    let mut changes = store.changes();

    async_stream::try_stream! {
        let mut last = store.query(&collection, &filter, order.as_ref()).await?;
        yield last.clone();

        loop {
            match changes.recv().await {
                Ok(change) if change.collection != collection => continue,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(%collection, skipped, "snapshot feed lagged, re-querying");
                }
                Err(RecvError::Closed) => break,
            }

            let snapshot = store.query(&collection, &filter, order.as_ref()).await?;
            if snapshot != last {
                last = snapshot.clone();
                yield snapshot;
            }
        }
    }
}
