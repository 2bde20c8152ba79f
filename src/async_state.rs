// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Asynchronous, cache-free engine.
//!
//! Every read and write round-trips through the backend. Writes notify
//! subscribers only after the backend has confirmed them, so an observer
//! never sees a value that is not durable yet. A failed write notifies
//! nobody and returns the backend's error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::engine::{EngineMode, StateEngine};
use crate::error::StateError;
use crate::keys::{self, StateKey};
use crate::storage::{StateBackend, ValueMap};
use crate::subscribers::{ChangeCallback, SubscriberRegistry, SubscriptionHandle};

const ENGINE: &str = "async";

pub struct AsyncState {
    backend: Arc<dyn StateBackend>,
    subscribers: SubscriberRegistry,
}

impl AsyncState {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            subscribers: SubscriberRegistry::new(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    /// Read a single key; `None` if the backend has no value for it.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        let result = self.backend.get(key).await;
        crate::metrics::record_result(ENGINE, "get", &result);
        Ok(result?)
    }

    /// Read several keys. The result holds exactly the requested keys.
    pub async fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> Result<ValueMap, StateError> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let result = self.backend.multi_get(&keys).await;
        crate::metrics::record_result(ENGINE, "multi_get", &result);
        let found = result?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let value = found.get(&key).cloned().flatten();
                (key, value)
            })
            .collect())
    }

    /// Persist `value`, then notify subscribers of `key`.
    #[tracing::instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        let result = self.backend.set(key, &value).await;
        crate::metrics::record_result(ENGINE, "set", &result);
        result?;
        let delivered = self.subscribers.notify(key, Some(&value));
        debug!(delivered, "Value persisted and published");
        Ok(())
    }

    /// Persist the removal, then notify subscribers of `key` with absent.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<(), StateError> {
        let result = self.backend.remove(key).await;
        crate::metrics::record_result(ENGINE, "remove", &result);
        result?;
        let delivered = self.subscribers.notify(key, None);
        debug!(delivered, "Removal persisted and published");
        Ok(())
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, StateError> {
        let value = self.get(key.name()).await?;
        keys::decode(key.name(), value)
    }

    pub async fn set_typed<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<(), StateError> {
        let value = keys::encode(key.name(), value)?;
        self.set(key.name(), value).await
    }

    /// Subscribe to changes of `key`. The callback receives the new value,
    /// or `None` when the key is removed.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(key, callback)
    }

    pub fn unsubscribe(&self, key: &str, handle: SubscriptionHandle) -> Result<(), StateError> {
        self.subscribers.unsubscribe(key, handle)
    }

    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.subscriber_count(key)
    }
}

#[async_trait]
impl StateEngine for AsyncState {
    fn mode(&self) -> EngineMode {
        EngineMode::Async
    }

    fn cached(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StateError> {
        AsyncState::multi_get(self, keys).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        AsyncState::set(self, key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        AsyncState::remove(self, key).await
    }

    fn subscribe(&self, key: &str, callback: ChangeCallback) -> SubscriptionHandle {
        self.subscribers.subscribe(key, move |value| callback(value))
    }

    fn unsubscribe(&self, key: &str, handle: SubscriptionHandle) -> Result<(), StateError> {
        self.subscribers.unsubscribe(key, handle)
    }
}
