// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Result of a bulk read: every requested key maps to its value, or `None`
/// when the backend holds nothing for it.
pub type ValueMap = HashMap<String, Option<Value>>;

/// Failure reported by a persistence backend.
///
/// The engines never retry or mask these; they reach the caller unchanged
/// (wrapped in [`crate::StateError::Backend`]).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored data is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Capability set a persistence provider must offer.
///
/// Values are JSON-compatible. A backend that can store richer types may
/// accept them, but then loses interoperability with the other backends.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Enumerate every key currently present.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Read one key. `Ok(None)` means the key is not present.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store `value` under `key`. Must be atomic per key.
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Read several keys at once.
    ///
    /// The result holds an entry for every requested key.
    /// Default implementation falls back to sequential gets.
    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StorageError> {
        let mut values = ValueMap::with_capacity(keys.len());
        for key in keys {
            let value = self.get(key).await?;
            values.insert(key.clone(), value);
        }
        Ok(values)
    }
}
