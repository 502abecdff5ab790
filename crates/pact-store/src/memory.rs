// memory.rs — In-process DocumentStore backend.
//
// Collections are BTreeMaps behind a single tokio RwLock, so every write
// (including the compare-and-set in `update_if`) is atomic with respect to
// every other caller sharing the same `MemoryStore`.
//
// Collections can be taken offline to simulate backend outages; every
// operation against an offline collection fails with `Unavailable`. A
// collection can also drop a fixed number of upcoming puts, which models
// a brief blip rather than an outage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::document::{merge, ChangeKind, Document, DocumentChange, Filter, OrderBy};
use crate::error::StoreError;
use crate::store::DocumentStore;

const CHANGE_FEED_CAPACITY: usize = 256;

type Collection = BTreeMap<String, Document>;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    offline: Mutex<HashSet<String>>,
    dropped_puts: Mutex<HashMap<String, usize>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            offline: Mutex::new(HashSet::new()),
            dropped_puts: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Make every operation on `collection` fail with `Unavailable`.
    pub fn take_offline(&self, collection: &str) {
        if let Ok(mut offline) = self.offline.lock() {
            offline.insert(collection.to_string());
        }
    }

    pub fn bring_online(&self, collection: &str) {
        if let Ok(mut offline) = self.offline.lock() {
            offline.remove(collection);
        }
    }

    /// Fail the next `count` puts into `collection` with `Unavailable`.
    pub fn drop_next_puts(&self, collection: &str, count: usize) {
        if let Ok(mut dropped) = self.dropped_puts.lock() {
            dropped.insert(collection.to_string(), count);
        }
    }

    /// Number of documents currently in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.len())
    }

    fn check_online(&self, collection: &str) -> Result<(), StoreError> {
        let offline = self
            .offline
            .lock()
            .map(|o| o.contains(collection))
            .unwrap_or(false);
        if offline {
            return Err(StoreError::Unavailable(format!(
                "collection '{}' is offline",
                collection
            )));
        }
        Ok(())
    }

    fn check_put(&self, collection: &str) -> Result<(), StoreError> {
        self.check_online(collection)?;
        let dropped = match self.dropped_puts.lock() {
            Ok(mut dropped) => match dropped.get_mut(collection) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if dropped {
            return Err(StoreError::Unavailable(format!(
                "put into '{}' dropped",
                collection
            )));
        }
        Ok(())
    }

    fn publish(&self, collection: &str, id: &str, kind: ChangeKind) {
        tracing::debug!(collection, id, ?kind, "memory store write");
        // No subscribers is fine.
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_online(collection)?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_online(collection)?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|c| c.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        if let Some(order) = order {
            order.sort(&mut docs);
        }
        Ok(docs)
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        mut fields: Document,
    ) -> Result<(), StoreError> {
        self.check_put(collection)?;
        fields.insert("id".to_string(), id.into());
        let existed = {
            let mut collections = self.collections.write().await;
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), fields)
                .is_some()
        };
        let kind = if existed {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.publish(collection, id, kind);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        self.check_online(collection)?;
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            merge(doc, fields);
        }
        self.publish(collection, id, ChangeKind::Updated);
        Ok(())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &Filter,
        fields: Document,
    ) -> Result<bool, StoreError> {
        self.check_online(collection)?;
        {
            let mut collections = self.collections.write().await;
            let doc = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            if !guard.matches(doc) {
                return Ok(false);
            }
            merge(doc, fields);
        }
        self.publish(collection, id, ChangeKind::Updated);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check_online(collection)?;
        let removed = {
            let mut collections = self.collections.write().await;
            collections
                .get_mut(collection)
                .and_then(|c| c.remove(id))
                .is_some()
        };
        if removed {
            self.publish(collection, id, ChangeKind::Deleted);
        }
        Ok(removed)
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio_stream::StreamExt;

    use super::*;
    use crate::store::subscribe;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn put_get_round_trip_sets_id() {
        let store = MemoryStore::new();
        store.put("goals", "g1", doc(json!({"a": 1}))).await.unwrap();

        let found = store.get("goals", "g1").await.unwrap().unwrap();
        assert_eq!(found["id"], json!("g1"));
        assert_eq!(found["a"], json!(1));
        assert!(store.get("goals", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_assigns_fresh_ids() {
        let store = MemoryStore::new();
        let a = store.insert("goals", doc(json!({}))).await.unwrap();
        let b = store.insert("goals", doc(json!({}))).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len("goals").await, 2);
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("goals", "nope", doc(json!({"a": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_if_only_writes_when_guard_matches() {
        let store = MemoryStore::new();
        store
            .put("goals", "g1", doc(json!({"status": "pending"})))
            .await
            .unwrap();
        let guard = Filter::new().eq("status", "pending");

        let first = store
            .update_if("goals", "g1", &guard, doc(json!({"status": "approved"})))
            .await
            .unwrap();
        let second = store
            .update_if("goals", "g1", &guard, doc(json!({"status": "suggested"})))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let found = store.get("goals", "g1").await.unwrap().unwrap();
        assert_eq!(found["status"], json!("approved"));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .put("n", "1", doc(json!({"userId": "u1", "createdAt": "2026-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .put("n", "2", doc(json!({"userId": "u1", "createdAt": "2026-01-02T00:00:00Z"})))
            .await
            .unwrap();
        store
            .put("n", "3", doc(json!({"userId": "u2", "createdAt": "2026-01-03T00:00:00Z"})))
            .await
            .unwrap();

        let docs = store
            .query(
                "n",
                &Filter::new().eq("userId", "u1"),
                Some(&OrderBy::desc("createdAt")),
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("2"), json!("1")]);
    }

    #[tokio::test]
    async fn offline_collection_is_unavailable() {
        let store = MemoryStore::new();
        store.take_offline("notifications");
        let err = store.get("notifications", "x").await.unwrap_err();
        assert!(err.is_transient());
        // Other collections are unaffected.
        assert!(store.get("goals", "x").await.unwrap().is_none());

        store.bring_online("notifications");
        assert!(store.get("notifications", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_puts_fail_then_recover() {
        let store = MemoryStore::new();
        store.drop_next_puts("notifications", 1);

        let err = store
            .put("notifications", "n1", doc(json!({})))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.get("notifications", "n1").await.unwrap().is_none());

        store
            .put("notifications", "n1", doc(json!({})))
            .await
            .unwrap();
        assert_eq!(store.len("notifications").await, 1);
    }

    #[tokio::test]
    async fn writes_are_published_on_the_change_feed() {
        let store = MemoryStore::new();
        let mut rx = store.changes();
        store.put("goals", "g1", doc(json!({}))).await.unwrap();
        store.delete("goals", "g1").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Created);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn subscribe_yields_initial_and_changed_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let feed = subscribe(
            store.clone(),
            "n",
            Filter::new().eq("userId", "u1"),
            None,
        );
        tokio::pin!(feed);

        let initial = feed.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        // A write to another user's document changes nothing for u1.
        store.put("n", "x", doc(json!({"userId": "u2"}))).await.unwrap();
        store.put("n", "y", doc(json!({"userId": "u1"}))).await.unwrap();

        let next = feed.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0]["id"], json!("y"));
    }
}
