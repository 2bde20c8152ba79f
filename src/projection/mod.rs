// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Multi-key projection.
//!
//! A [`Projection`] bundles, for a list of keys, the current value plus a
//! setter and a remover per key. Accessor names follow the `set<Key>` /
//! `remove<Key>` convention with the key's first letter upper-cased, so a
//! binding layer can expose `setVolume`, `removeVolume`, ... without any
//! runtime name synthesis of its own.
//!
//! Seeding depends on the engine: a sync engine contributes its cached
//! values immediately, an async engine leaves every key absent until
//! [`Projection::refresh`] runs a bulk read.
//!
//! ```rust
//! use std::sync::Arc;
//! use local_state::{MemoryBackend, Projection, SyncState};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), local_state::StateError> {
//! let state = Arc::new(SyncState::new(Arc::new(MemoryBackend::new())));
//! let bundle = Projection::new(state.clone(), &["volume", "muted"])?;
//!
//! bundle.setter("setVolume").expect("derived setter").set(json!(7)).await?;
//! assert_eq!(state.get("volume"), Some(json!(7)));
//! # Ok(())
//! # }
//! ```

mod watched;

pub use watched::WatchedProjection;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::{EngineMode, StateEngine};
use crate::error::StateError;
use crate::storage::ValueMap;

/// `set` + key with its first character upper-cased.
#[must_use]
pub fn setter_name(key: &str) -> String {
    format!("set{}", capitalize_first(key))
}

/// `remove` + key with its first character upper-cased.
#[must_use]
pub fn remover_name(key: &str) -> String {
    format!("remove{}", capitalize_first(key))
}

fn capitalize_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Getter value, setter and remover for one key.
#[derive(Clone)]
pub struct KeyAccessor {
    key: String,
    setter: String,
    remover: String,
    value: Option<Value>,
    engine: Arc<dyn StateEngine>,
}

impl KeyAccessor {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value as of construction, the last refresh, or the last applied change.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn setter_name(&self) -> &str {
        &self.setter
    }

    #[must_use]
    pub fn remover_name(&self) -> &str {
        &self.remover
    }

    /// Delegates to the engine's `set` for this key.
    pub async fn set(&self, value: Value) -> Result<(), StateError> {
        self.engine.set(&self.key, value).await
    }

    /// Delegates to the engine's `remove` for this key.
    pub async fn remove(&self) -> Result<(), StateError> {
        self.engine.remove(&self.key).await
    }
}

impl std::fmt::Debug for KeyAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAccessor")
            .field("key", &self.key)
            .field("setter", &self.setter)
            .field("remover", &self.remover)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

pub struct Projection {
    engine: Arc<dyn StateEngine>,
    accessors: Vec<KeyAccessor>,
    by_key: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Projection {
    /// Build accessors for `keys`, in order. Repeated keys are folded into
    /// one accessor.
    ///
    /// Fails with [`StateError::AccessorCollision`] when two distinct keys
    /// derive the same accessor name (`"volume"` and `"Volume"` both give
    /// `setVolume`).
    pub fn new<K: AsRef<str>>(engine: Arc<dyn StateEngine>, keys: &[K]) -> Result<Self, StateError> {
        let mut accessors: Vec<KeyAccessor> = Vec::with_capacity(keys.len());
        let mut by_key: HashMap<String, usize> = HashMap::with_capacity(keys.len());
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(keys.len() * 2);

        for key in keys {
            let key = key.as_ref();
            if by_key.contains_key(key) {
                continue;
            }
            let index = accessors.len();
            let setter = setter_name(key);
            let remover = remover_name(key);
            for name in [&setter, &remover] {
                if let Some(&other) = by_name.get(name.as_str()) {
                    let first: &KeyAccessor = &accessors[other];
                    return Err(StateError::AccessorCollision {
                        name: name.clone(),
                        first: first.key.clone(),
                        second: key.to_string(),
                    });
                }
                by_name.insert(name.clone(), index);
            }
            by_key.insert(key.to_string(), index);
            accessors.push(KeyAccessor {
                key: key.to_string(),
                setter,
                remover,
                value: engine.cached(key),
                engine: Arc::clone(&engine),
            });
        }

        Ok(Self {
            engine,
            accessors,
            by_key,
            by_name,
        })
    }

    #[must_use]
    pub fn mode(&self) -> EngineMode {
        self.engine.mode()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.accessors.iter().map(|a| a.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyAccessor> {
        self.accessors.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Current getter value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.accessor(key).and_then(KeyAccessor::value)
    }

    /// Getter values of every projected key.
    #[must_use]
    pub fn values(&self) -> ValueMap {
        self.accessors
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn accessor(&self, key: &str) -> Option<&KeyAccessor> {
        self.by_key.get(key).map(|&i| &self.accessors[i])
    }

    /// Accessor whose setter is called `name`, e.g. `"setVolume"`.
    #[must_use]
    pub fn setter(&self, name: &str) -> Option<&KeyAccessor> {
        self.by_name
            .get(name)
            .map(|&i| &self.accessors[i])
            .filter(|a| a.setter == name)
    }

    /// Accessor whose remover is called `name`, e.g. `"removeVolume"`.
    #[must_use]
    pub fn remover(&self, name: &str) -> Option<&KeyAccessor> {
        self.by_name
            .get(name)
            .map(|&i| &self.accessors[i])
            .filter(|a| a.remover == name)
    }

    /// Bulk-read every projected key and replace the getter values.
    pub async fn refresh(&mut self) -> Result<(), StateError> {
        let keys: Vec<String> = self.keys().map(str::to_string).collect();
        let values = self.engine.multi_get(&keys).await?;
        for accessor in &mut self.accessors {
            accessor.value = values.get(&accessor.key).cloned().flatten();
        }
        Ok(())
    }

    /// Record a change notification. Returns false if `key` is not projected.
    pub fn apply(&mut self, key: &str, value: Option<Value>) -> bool {
        match self.by_key.get(key) {
            Some(&i) => {
                self.accessors[i].value = value;
                true
            }
            None => false,
        }
    }

    /// Keep this bundle current by subscribing to every projected key.
    #[must_use]
    pub fn watch(self) -> WatchedProjection {
        WatchedProjection::new(self)
    }

    pub(crate) fn engine(&self) -> &Arc<dyn StateEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, StateBackend};
    use crate::{AsyncState, SyncState};
    use serde_json::json;

    fn sync_engine(entries: &[(&str, Value)]) -> Arc<SyncState> {
        let backend = MemoryBackend::with_entries(entries.iter().map(|(k, v)| (k.to_string(), v.clone())));
        Arc::new(SyncState::new(Arc::new(backend)))
    }

    #[test]
    fn test_accessor_names() {
        assert_eq!(setter_name("key1"), "setKey1");
        assert_eq!(remover_name("key1"), "removeKey1");
        assert_eq!(setter_name("Already"), "setAlready");
        assert_eq!(setter_name("émoji"), "setÉmoji");
        assert_eq!(setter_name(""), "set");
    }

    #[test]
    fn test_colliding_keys_are_rejected() {
        let engine = sync_engine(&[]);
        let err = Projection::new(engine, &["volume", "Volume"]).err().unwrap();
        match err {
            StateError::AccessorCollision { name, first, second } => {
                assert_eq!(name, "setVolume");
                assert_eq!(first, "volume");
                assert_eq!(second, "Volume");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repeated_keys_fold() {
        let projection = Projection::new(sync_engine(&[]), &["a", "b", "a"]).unwrap();
        assert_eq!(projection.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sync_mode_seeds_from_cache() {
        let engine = sync_engine(&[("a", json!(1))]);
        engine.load(false).await.unwrap();

        let projection = Projection::new(engine, &["a", "b"]).unwrap();
        assert_eq!(projection.mode(), EngineMode::Sync);
        assert_eq!(projection.get("a"), Some(&json!(1)));
        assert_eq!(projection.get("b"), None);
    }

    #[tokio::test]
    async fn test_async_mode_seeds_absent_until_refresh() {
        let backend = Arc::new(MemoryBackend::with_entries([("a", json!("x"))]));
        let engine = Arc::new(AsyncState::new(backend));

        let mut projection = Projection::new(engine, &["a", "b"]).unwrap();
        assert_eq!(projection.get("a"), None);

        projection.refresh().await.unwrap();
        assert_eq!(projection.get("a"), Some(&json!("x")));
        let values = projection.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["b"], None);
    }

    #[tokio::test]
    async fn test_setter_and_remover_delegate() {
        let engine = sync_engine(&[]);
        let projection = Projection::new(engine.clone(), &["key1"]).unwrap();

        projection.setter("setKey1").unwrap().set(json!(5)).await.unwrap();
        assert_eq!(engine.get("key1"), Some(json!(5)));
        assert_eq!(engine.backend().get("key1").await.unwrap(), Some(json!(5)));

        projection.remover("removeKey1").unwrap().remove().await.unwrap();
        assert_eq!(engine.get("key1"), None);
    }

    #[test]
    fn test_lookup_by_wrong_kind_of_name() {
        let projection = Projection::new(sync_engine(&[]), &["key1"]).unwrap();
        assert!(projection.setter("removeKey1").is_none());
        assert!(projection.remover("setKey1").is_none());
        assert!(projection.setter("setKey2").is_none());
    }

    #[test]
    fn test_apply_updates_projected_keys_only() {
        let mut projection = Projection::new(sync_engine(&[]), &["a"]).unwrap();
        assert!(projection.apply("a", Some(json!(3))));
        assert!(!projection.apply("z", Some(json!(3))));
        assert_eq!(projection.get("a"), Some(&json!(3)));
    }
}
