// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use crate::engine::StateEngine;
use crate::error::StateError;
use crate::storage::ValueMap;
use crate::subscribers::SubscriptionHandle;

use super::{KeyAccessor, Projection};

/// A [`Projection`] that follows change notifications.
///
/// Every projected key is subscribed on construction and unsubscribed on
/// drop. Notifications are applied to the wrapped projection, so values and
/// accessors read through this type are current. Each applied change bumps
/// a generation counter that a binding layer can await through
/// [`WatchedProjection::changes`] to know when to re-render.
pub struct WatchedProjection {
    projection: Arc<RwLock<Projection>>,
    engine: Arc<dyn StateEngine>,
    generation: Arc<watch::Sender<u64>>,
    handles: Vec<(String, SubscriptionHandle)>,
}

impl WatchedProjection {
    pub(super) fn new(projection: Projection) -> Self {
        let engine = Arc::clone(projection.engine());
        let keys: Vec<String> = projection.keys().map(str::to_string).collect();
        let projection = Arc::new(RwLock::new(projection));
        let (generation, _) = watch::channel(0u64);
        let generation = Arc::new(generation);

        let handles = keys
            .into_iter()
            .map(|key| {
                let projection = Arc::clone(&projection);
                let generation = Arc::clone(&generation);
                let watched_key = key.clone();
                let handle = engine.subscribe(
                    &key,
                    Arc::new(move |value: Option<&Value>| {
                        projection.write().apply(&watched_key, value.cloned());
                        generation.send_modify(|g| *g += 1);
                    }),
                );
                (key, handle)
            })
            .collect();

        Self {
            projection,
            engine,
            generation,
            handles,
        }
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.projection.read().get(key).cloned()
    }

    /// Current values of every projected key.
    #[must_use]
    pub fn snapshot(&self) -> ValueMap {
        self.projection.read().values()
    }

    /// Receiver whose value increases on every applied change.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Copy of the accessor for `key`, holding the current value.
    #[must_use]
    pub fn accessor(&self, key: &str) -> Option<KeyAccessor> {
        self.projection.read().accessor(key).cloned()
    }

    #[must_use]
    pub fn setter(&self, name: &str) -> Option<KeyAccessor> {
        self.projection.read().setter(name).cloned()
    }

    #[must_use]
    pub fn remover(&self, name: &str) -> Option<KeyAccessor> {
        self.projection.read().remover(name).cloned()
    }

    /// Bulk-read every projected key and replace the current values.
    pub async fn refresh(&self) -> Result<(), StateError> {
        let keys: Vec<String> = self.projection.read().keys().map(str::to_string).collect();
        let mut fresh = self.engine.multi_get(&keys).await?;
        {
            let mut projection = self.projection.write();
            for key in &keys {
                let value = fresh.remove(key).flatten();
                projection.apply(key, value);
            }
        }
        self.generation.send_modify(|g| *g += 1);
        Ok(())
    }
}

impl Drop for WatchedProjection {
    fn drop(&mut self) {
        for (key, handle) in self.handles.drain(..) {
            if let Err(e) = self.engine.unsubscribe(&key, handle) {
                warn!(key = %key, error = %e, "Failed to unsubscribe watched key");
            }
        }
    }
}
