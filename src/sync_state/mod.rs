// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronous, cache-backed engine.
//!
//! [`SyncState`] mirrors the backend into an in-memory cache so reads never
//! suspend. The cache is filled wholesale by [`SyncState::load`] and kept
//! current by local writes.
//!
//! # Write ordering
//!
//! `set`/`remove` update the cache and notify subscribers *before* the
//! backend sees the change, then hand back a [`PendingWrite`] that performs
//! the backend write:
//!
//! ```text
//! set(k, v) ──► cache[k] = v ──► notify(k, v) ──► return PendingWrite
//!                                                   │ (await / detach / drop)
//!                                                   ▼
//!                                             backend.set(k, v)
//! ```
//!
//! Between the cache update and backend confirmation, readers and
//! subscribers see a value that is not durable yet. If the backend write
//! fails, the cache is not rolled back and nobody is re-notified; the error
//! reaches whoever awaits the `PendingWrite`, or is logged and counted when
//! the write was detached or dropped. Concurrent writers to one key
//! are not coalesced: the last backend write to land wins durably, while
//! notifications follow call order.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──load()──► Loading ──► Loaded ──load()──► Loading ──► Loaded ...
//! ```
//!
//! Loading subscribers hear `true` on every entry into `Loading` and
//! `false` when it is left. A forced load started during another load
//! keeps the state in `Loading` until both have finished.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use local_state::{MemoryBackend, SyncState};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), local_state::StateError> {
//! let state = SyncState::new(Arc::new(MemoryBackend::new()));
//! state.load(false).await?;
//!
//! let write = state.set("theme", json!("dark"));
//! assert_eq!(state.get("theme"), Some(json!("dark"))); // before the backend write
//! write.await?;
//! # Ok(())
//! # }
//! ```

mod types;
mod lifecycle;

pub use types::{LoadState, PendingWrite};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::config::LocalStateConfig;
use crate::engine::{EngineMode, StateEngine};
use crate::error::StateError;
use crate::keys::{self, StateKey};
use crate::storage::{StateBackend, ValueMap};
use crate::subscribers::{ChangeCallback, LoadingSubscribers, SubscriberRegistry, SubscriptionHandle};

use types::{LoadTracker, WriteOp};

const ENGINE: &str = "sync";

pub struct SyncState {
    pub(super) backend: Arc<dyn StateBackend>,

    pub(super) config: LocalStateConfig,

    /// In-memory mirror of the backend
    pub(super) cache: DashMap<String, Value>,

    /// Per-key change subscribers
    pub(super) subscribers: SubscriberRegistry,

    /// Loading signal subscribers (own handle counter)
    pub(super) loading_subscribers: LoadingSubscribers,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<LoadState>,

    /// In-flight load count; guards every transition of `state`
    pub(super) loads: Mutex<LoadTracker>,
}

impl SyncState {
    /// Create an engine with an empty cache in the `Idle` state.
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self::with_config(backend, LocalStateConfig::default())
    }

    pub fn with_config(backend: Arc<dyn StateBackend>, config: LocalStateConfig) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            backend,
            config,
            cache: DashMap::new(),
            subscribers: SubscriberRegistry::new(),
            loading_subscribers: LoadingSubscribers::new(),
            state,
            loads: Mutex::new(LoadTracker::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LocalStateConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    /// Read a key from the cache. Never suspends; may be stale or absent
    /// while loading or before the first load.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(key).map(|r| r.value().clone())
    }

    /// Read several keys from the cache. The result holds exactly the
    /// requested keys.
    #[must_use]
    pub fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> ValueMap {
        keys.iter()
            .map(|key| {
                let key = key.as_ref();
                (key.to_string(), self.get(key))
            })
            .collect()
    }

    /// Write `value` to the cache and notify subscribers immediately.
    ///
    /// The returned [`PendingWrite`] persists it to the backend.
    pub fn set(&self, key: &str, value: Value) -> PendingWrite {
        self.cache.insert(key.to_string(), value.clone());
        crate::metrics::set_cache_entries(self.cache.len());
        let delivered = self.subscribers.notify(key, Some(&value));
        debug!(key, delivered, "Cache updated ahead of backend");

        let backend = Arc::clone(&self.backend);
        let target = key.to_string();
        PendingWrite::new(
            key.to_string(),
            WriteOp::Set,
            Box::pin(async move {
                let result = backend.set(&target, &value).await;
                crate::metrics::record_result(ENGINE, "set", &result);
                result
            }),
        )
    }

    /// Drop `key` from the cache and notify subscribers with absent
    /// immediately. The returned [`PendingWrite`] removes it from the backend.
    pub fn remove(&self, key: &str) -> PendingWrite {
        self.cache.remove(key);
        crate::metrics::set_cache_entries(self.cache.len());
        let delivered = self.subscribers.notify(key, None);
        debug!(key, delivered, "Cache entry removed ahead of backend");

        let backend = Arc::clone(&self.backend);
        let target = key.to_string();
        PendingWrite::new(
            key.to_string(),
            WriteOp::Remove,
            Box::pin(async move {
                let result = backend.remove(&target).await;
                crate::metrics::record_result(ENGINE, "remove", &result);
                result
            }),
        )
    }

    pub fn get_typed<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<Option<T>, StateError> {
        keys::decode(key.name(), self.get(key.name()))
    }

    /// Typed [`set`](Self::set). Encoding happens before the cache is
    /// touched, so an unencodable value changes nothing.
    pub fn set_typed<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<PendingWrite, StateError> {
        let value = keys::encode(key.name(), value)?;
        Ok(self.set(key.name(), value))
    }

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

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Copy of the whole cache.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.cache
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

#[async_trait]
impl StateEngine for SyncState {
    fn mode(&self) -> EngineMode {
        EngineMode::Sync
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StateError> {
        Ok(SyncState::multi_get(self, keys))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        SyncState::set(self, key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        SyncState::remove(self, key).await
    }

    fn subscribe(&self, key: &str, callback: ChangeCallback) -> SubscriptionHandle {
        self.subscribers.subscribe(key, move |value| callback(value))
    }

    fn unsubscribe(&self, key: &str, handle: SubscriptionHandle) -> Result<(), StateError> {
        self.subscribers.unsubscribe(key, handle)
    }
}
