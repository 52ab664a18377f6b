//! File-backed key-value store.
//!
//! All records of one store live in a single JSON document
//! (`<dir>/<name>.json`). Every mutation rewrites the document through a
//! temporary file and a rename, so a crash leaves either the old or the new
//! document on disk.

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{validate_key, KeyValueStore, StoreError};

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    name: String,
    records: HashMap<String, JsonValue>,
}

/// A store persisted to a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    document: Arc<RwLock<StoreDocument>>,
}

impl FileStore {
    /// Open (or create) the store named `name` inside `dir`.
    pub async fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        validate_key(name)?;
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{name}.json"));

        let document = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let doc: StoreDocument = serde_json::from_slice(&raw)?;
                if doc.name != name {
                    warn!(expected = name, found = %doc.name, "Store document name mismatch");
                }
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument {
                name: name.to_string(),
                records: HashMap::new(),
            },
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), records = document.records.len(), "Opened file store");

        Ok(Self {
            path,
            document: Arc::new(RwLock::new(document)),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Flushed store");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        validate_key(key)?;
        Ok(self.document.read().await.records.get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut document = self.document.write().await;
        let previous = document.records.insert(key.to_string(), value);
        if let Err(e) = self.flush(&document).await {
            // Keep memory and disk in step when the write did not land.
            match previous {
                Some(old) => document.records.insert(key.to_string(), old),
                None => document.records.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let mut document = self.document.write().await;
        let Some(previous) = document.records.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&document).await {
            document.records.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut document = self.document.write().await;
        let previous = std::mem::take(&mut document.records);
        if let Err(e) = self.flush(&document).await {
            document.records = previous;
            return Err(e);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.document.read().await.records.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::open(dir.path(), "pwa-offline-tasks").await.unwrap();
        store
            .set("offline-tasks", json!([{"name": "something", "arguments": ["Alice"]}]))
            .await
            .unwrap();
        drop(store);

        let reopened = FileStore::open(dir.path(), "pwa-offline-tasks").await.unwrap();
        let value = reopened.get("offline-tasks").await.unwrap().unwrap();
        assert_eq!(value[0]["arguments"][0], "Alice");
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), "db").await.unwrap();
        store.set("k", json!(1)).await.unwrap();
        assert!(store.remove("k").await.unwrap());

        let reopened = FileStore::open(dir.path(), "db").await.unwrap();
        assert!(reopened.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), "db").await.unwrap();
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileStore::open(dir.path(), "db").await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("db.json"), b"{not json")
            .await
            .unwrap();

        let result = FileStore::open(dir.path(), "db").await;
        assert!(matches!(result, Err(StoreError::DataError(_))));
    }

    #[tokio::test]
    async fn test_failed_flush_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), "db").await.unwrap();
        store.set("k", json!("old")).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        tokio::fs::create_dir(dir.path().join("db.json.tmp")).await.unwrap();

        assert!(store.set("k", json!("new")).await.is_err());
        assert_eq!(store.get("k").await.unwrap(), Some(json!("old")));
    }
}
