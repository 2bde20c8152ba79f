// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Disk backend: the whole keyspace lives in one JSON object file.
//!
//! Every mutation rewrites the file through a temporary sibling and an
//! atomic `rename`, so a reader never observes a half-written keyspace.
//! Mutations are serialized through an async mutex; reads are lock-free.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{StateBackend, StorageError, ValueMap};

pub struct JsonFileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Back the keyspace with the file at `path`.
    ///
    /// The file does not need to exist; a missing file is an empty keyspace
    /// and is created (along with its parent directories) on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Backend(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), keys = map.len(), "Keyspace file rewritten");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl StateBackend for JsonFileBackend {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_all().await?.into_iter().map(|(key, _)| key).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value.clone());
        self.write_all(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_all(&map).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StorageError> {
        let map = self.read_all().await?;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), map.get(key).cloned()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend_in(dir: &tempfile::TempDir) -> JsonFileBackend {
        JsonFileBackend::new(dir.path().join("state").join("keys.json"))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_keyspace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir);

        assert!(backend.list().await.unwrap().is_empty());
        assert_eq!(backend.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        backend_in(&dir).set("theme", &json!("dark")).await.unwrap();

        let reopened = backend_in(&dir);
        assert_eq!(reopened.get("theme").await.unwrap(), Some(json!("dark")));
        assert!(!reopened.temp_path().exists());
    }

    #[tokio::test]
    async fn test_remove_absent_key_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir);

        backend.remove("ghost").await.unwrap();
        assert!(!backend.path().exists());
    }

    #[tokio::test]
    async fn test_remove_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir);
        backend.set("a", &json!(1)).await.unwrap();
        backend.set("b", &json!(2)).await.unwrap();

        backend.remove("a").await.unwrap();
        assert_eq!(backend.list().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_get_reports_every_requested_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir);
        backend.set("a", &json!([1, 2])).await.unwrap();

        let values = backend
            .multi_get(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values["a"], Some(json!([1, 2])));
        assert_eq!(values["b"], None);
    }

    #[tokio::test]
    async fn test_non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();

        let backend = JsonFileBackend::new(&path);
        assert!(matches!(backend.list().await, Err(StorageError::Backend(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let backend = JsonFileBackend::new(&path);
        assert!(matches!(backend.get("a").await, Err(StorageError::Format(_))));
    }
}
