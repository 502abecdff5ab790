// json_file.rs — JsonFileStore: DocumentStore persisted as JSON files.
//
// Each document is stored as `<store_dir>/<collection>/<id>.json`.
// This keeps documents isolated and makes the store easy to inspect
// manually; it is what the `pact` CLI uses between invocations.
//
// Every write holds an exclusive flock on `<store_dir>/.lock`, so the
// read-check-write in `update_if` is atomic across handles and processes
// sharing the directory (a long-running `pact sweep` and a one-shot
// `pact goal approve`). The async mutex keeps tasks of one handle queued
// in the runtime instead of parked on blocking threads. Documents are
// replaced by temp file + rename, so readers never see a partial file.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{broadcast, Mutex, MutexGuard};

use crate::document::{merge, ChangeKind, Document, DocumentChange, Filter, OrderBy};
use crate::error::StoreError;
use crate::store::DocumentStore;

const CHANGE_FEED_CAPACITY: usize = 256;
const LOCK_FILE: &str = ".lock";

/// Held for the duration of one write. Closing the file releases the flock.
struct WriteLock<'a> {
    _local: MutexGuard<'a, ()>,
    _file: File,
}

/// File-backed document store.
pub struct JsonFileStore {
    store_dir: PathBuf,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<DocumentChange>,
}

impl JsonFileStore {
    /// Create a new store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&store_dir).map_err(|source| StoreError::Io {
            path: store_dir.display().to_string(),
            source,
        })?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            store_dir,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        check_key(collection)?;
        Ok(self.store_dir.join(collection))
    }

    /// Path to the JSON file for a given document.
    fn doc_file(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_key(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{}.json", id)))
    }

    async fn read_doc(&self, path: &Path) -> Result<Option<Document>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    async fn write_doc(&self, path: &Path, doc: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || atomic_write(&path, &json))
            .await
            .map_err(|e| StoreError::Unavailable(format!("write task failed: {}", e)))?
    }

    /// Exclusive access to the store directory, across processes.
    async fn lock(&self) -> Result<WriteLock<'_>, StoreError> {
        let local = self.write_lock.lock().await;
        let path = self.store_dir.join(LOCK_FILE);
        let file = tokio::task::spawn_blocking(move || -> Result<File, StoreError> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|source| io_error(&path, source))?;
            lock_exclusive(&file).map_err(|source| io_error(&path, source))?;
            Ok(file)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("lock task failed: {}", e)))??;
        Ok(WriteLock {
            _local: local,
            _file: file,
        })
    }

    fn publish(&self, collection: &str, id: &str, kind: ChangeKind) {
        tracing::debug!(collection, id, ?kind, "json store write");
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

// Write to a temp file in the target directory, then rename over the
// target. The temp name has no `.json` extension, so queries never pick
// it up.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;

    let mut temp =
        tempfile::NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
    temp.write_all(data).map_err(|source| io_error(path, source))?;
    temp.as_file().sync_all().map_err(|source| io_error(path, source))?;
    temp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    loop {
        // SAFETY: flock is a plain POSIX call on a descriptor `file` owns
        // for the whole call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    file.lock()
}

// Keys become path components, so anything that could escape the
// collection directory is refused.
fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let path = self.doc_file(collection, id)?;
        self.read_doc(&path).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir.display().to_string(),
                    source,
                })
            }
        };

        let mut docs = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                // Skip unreadable or half-written files rather than failing the query.
                if let Ok(Some(doc)) = self.read_doc(&path).await {
                    if filter.matches(&doc) {
                        docs.push(doc);
                    }
                }
            }
        }

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
        let path = self.doc_file(collection, id)?;
        fields.insert("id".to_string(), id.into());

        let _lock = self.lock().await?;
        let existed = fs::try_exists(&path).await.unwrap_or(false);
        self.write_doc(&path, &fields).await?;
        let kind = if existed {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.publish(collection, id, kind);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let path = self.doc_file(collection, id)?;

        let _lock = self.lock().await?;
        let mut doc = self
            .read_doc(&path)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge(&mut doc, fields);
        self.write_doc(&path, &doc).await?;
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
        let path = self.doc_file(collection, id)?;

        let _lock = self.lock().await?;
        let mut doc = self
            .read_doc(&path)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        if !guard.matches(&doc) {
            return Ok(false);
        }
        merge(&mut doc, fields);
        self.write_doc(&path, &doc).await?;
        self.publish(collection, id, ChangeKind::Updated);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let path = self.doc_file(collection, id)?;

        let _lock = self.lock().await?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.publish(collection, id, ChangeKind::Deleted);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();

        store
            .put("goals", "g1", doc(json!({"targetCount": 3})))
            .await
            .unwrap();

        let found = store.get("goals", "g1").await.unwrap().unwrap();
        assert_eq!(found["id"], json!("g1"));
        assert_eq!(found["targetCount"], json!(3));
        assert!(dir.path().join("store/goals/g1.json").exists());
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        assert!(store.get("goals", "nope").await.unwrap().is_none());
        assert!(store
            .query("goals", &Filter::new(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_merges_and_removes_null_fields() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        store
            .put("goals", "g1", doc(json!({"a": 1, "b": 2})))
            .await
            .unwrap();

        store
            .update("goals", "g1", doc(json!({"a": 7, "b": null})))
            .await
            .unwrap();

        let found = store.get("goals", "g1").await.unwrap().unwrap();
        assert_eq!(Value::Object(found), json!({"id": "g1", "a": 7}));
    }

    #[tokio::test]
    async fn update_if_respects_guard() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        store
            .put("goals", "g1", doc(json!({"status": "pending"})))
            .await
            .unwrap();
        let guard = Filter::new().eq("status", "pending");

        assert!(store
            .update_if("goals", "g1", &guard, doc(json!({"status": "approved"})))
            .await
            .unwrap());
        assert!(!store
            .update_if("goals", "g1", &guard, doc(json!({"status": "suggested"})))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn query_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        store
            .put("goals", "g1", doc(json!({"userId": "u1"})))
            .await
            .unwrap();
        std::fs::write(dir.path().join("store/goals/broken.json"), "{ not json").unwrap();

        let docs = store.query("goals", &Filter::new(), None).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        store.put("goals", "g1", doc(json!({}))).await.unwrap();

        assert!(store.delete("goals", "g1").await.unwrap());
        assert!(!store.delete("goals", "g1").await.unwrap());
        assert!(store.get("goals", "g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_escaping_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        let err = store.get("goals", "../secrets").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("store");

        {
            let store = JsonFileStore::new(&store_path).unwrap();
            store
                .put("goals", "g1", doc(json!({"title": "Persistent"})))
                .await
                .unwrap();
        }

        {
            let store = JsonFileStore::new(&store_path).unwrap();
            let found = store.get("goals", "g1").await.unwrap().unwrap();
            assert_eq!(found["title"], json!("Persistent"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn update_if_is_exclusive_across_handles() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        let a = std::sync::Arc::new(JsonFileStore::new(&root).unwrap());
        let b = std::sync::Arc::new(JsonFileStore::new(&root).unwrap());
        let pending = Filter::new().eq("status", json!("pending"));

        for round in 0..50 {
            let id = format!("g{}", round);
            a.put("goals", &id, doc(json!({"status": "pending"})))
                .await
                .unwrap();

            let (first, second) = tokio::join!(
                tokio::spawn({
                    let (a, id, pending) = (a.clone(), id.clone(), pending.clone());
                    async move {
                        a.update_if("goals", &id, &pending, doc(json!({"status": "approved"})))
                            .await
                    }
                }),
                tokio::spawn({
                    let (b, id, pending) = (b.clone(), id.clone(), pending.clone());
                    async move {
                        b.update_if("goals", &id, &pending, doc(json!({"status": "suggested"})))
                            .await
                    }
                }),
            );
            let wins = [first.unwrap().unwrap(), second.unwrap().unwrap()];
            assert_eq!(
                wins.iter().filter(|won| **won).count(),
                1,
                "round {} let both writers through",
                round
            );
        }
    }

    #[tokio::test]
    async fn writes_leave_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store")).unwrap();
        store
            .put("goals", "g1", doc(json!({"a": 1})))
            .await
            .unwrap();
        store
            .update("goals", "g1", doc(json!({"a": 2})))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("store/goals"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["g1.json".to_string()]);
        assert_eq!(store.get("goals", "g1").await.unwrap().unwrap()["a"], json!(2));
    }
}
