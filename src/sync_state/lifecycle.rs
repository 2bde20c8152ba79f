// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache loading life-cycle: bulk load, loading signal, state watching.

use std::collections::HashSet;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ReconcilePolicy;
use crate::error::StateError;
use crate::subscribers::SubscriptionHandle;

use super::{LoadState, SyncState};

impl SyncState {
    /// Load every key the backend reports into the cache.
    ///
    /// Runs unless a load is already in progress; `force` starts another
    /// one regardless. Each loaded key is written to the cache and its
    /// subscribers are notified. Cached keys the backend does not report
    /// are kept or dropped per [`ReconcilePolicy`].
    ///
    /// Overlapping loads share one `Loading` period: loading subscribers
    /// hear `true` when the first starts and `false` when the last ends.
    ///
    /// Not serialized against concurrent `set`/`remove`: a local write that
    /// lands while the bulk read is in flight may be overwritten by it.
    ///
    /// On backend failure nothing from this load is applied, and the error
    /// is returned. If no overlapping load succeeded, the state returns to
    /// what it was before loading began.
    #[tracing::instrument(skip(self), fields(keys))]
    pub async fn load(&self, force: bool) -> Result<(), StateError> {
        let Some(first) = self.begin_load(force) else {
            debug!("Load already in progress");
            return Ok(());
        };
        if first {
            self.loading_subscribers.notify(true);
        }

        let started = Instant::now();
        let outcome = match self.fetch_all().await {
            Ok(loaded) => {
                let count = loaded.len();
                tracing::Span::current().record("keys", count);
                self.apply_loaded(loaded);
                Ok(count)
            }
            Err(e) => Err(e),
        };

        let settled = self.finish_load(outcome.is_ok());
        if settled.is_some() {
            self.loading_subscribers.notify(false);
        }

        match outcome {
            Ok(count) => {
                crate::metrics::record_load("success", count, started.elapsed());
                info!(keys = count, cached = self.cache.len(), "Cache loaded from backend");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, settled = ?settled, "Load failed");
                crate::metrics::record_load("error", 0, started.elapsed());
                Err(e)
            }
        }
    }

    /// Load only if the cache has never been loaded.
    pub async fn ensure_loaded(&self) -> Result<(), StateError> {
        if self.load_state() == LoadState::Idle {
            self.load(false).await
        } else {
            Ok(())
        }
    }

    /// Wait until the state is `Loaded`. Does not start a load.
    pub async fn wait_loaded(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == LoadState::Loaded).await;
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.load_state() == LoadState::Loading
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Subscribe to the loading signal: `true` when a load starts, `false`
    /// when it ends.
    pub fn subscribe_loading<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.loading_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_loading(&self, handle: SubscriptionHandle) -> Result<(), StateError> {
        self.loading_subscribers.unsubscribe(handle)
    }

    /// Register a load. `None` if one is running and `force` is unset;
    /// otherwise whether this load opened the `Loading` period.
    fn begin_load(&self, force: bool) -> Option<bool> {
        let mut loads = self.loads.lock();
        if loads.in_flight > 0 && !force {
            return None;
        }
        if loads.in_flight == 0 {
            loads.settle_to = *self.state.borrow();
            self.state.send_replace(LoadState::Loading);
        }
        loads.in_flight += 1;
        Some(loads.in_flight == 1)
    }

    /// Deregister a load. Returns the published state when this was the
    /// last one in flight.
    fn finish_load(&self, succeeded: bool) -> Option<LoadState> {
        let mut loads = self.loads.lock();
        if succeeded {
            loads.settle_to = LoadState::Loaded;
        }
        loads.in_flight = loads.in_flight.saturating_sub(1);
        if loads.in_flight > 0 {
            return None;
        }
        self.state.send_replace(loads.settle_to);
        Some(loads.settle_to)
    }

    /// Enumerate the backend and bulk-read it, chunked per config.
    ///
    /// Only keys the backend returned an entry for are included, in
    /// enumeration order.
    async fn fetch_all(&self) -> Result<Vec<(String, Option<Value>)>, StateError> {
        let keys = self.backend.list().await?;
        let chunk_size = match self.config.load_batch_size {
            0 => keys.len().max(1),
            n => n,
        };

        let mut loaded = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(chunk_size) {
            let mut values = self.backend.multi_get(chunk).await?;
            for key in chunk {
                if let Some(value) = values.remove(key) {
                    loaded.push((key.clone(), value));
                }
            }
        }
        Ok(loaded)
    }

    fn apply_loaded(&self, loaded: Vec<(String, Option<Value>)>) {
        for (key, value) in &loaded {
            match value {
                Some(value) => {
                    self.cache.insert(key.clone(), value.clone());
                }
                None => {
                    self.cache.remove(key);
                }
            }
            self.subscribers.notify(key, value.as_ref());
        }

        if self.config.reconcile_on_load == ReconcilePolicy::Prune {
            let reported: HashSet<&str> = loaded.iter().map(|(key, _)| key.as_str()).collect();
            let stale: Vec<String> = self
                .cache
                .iter()
                .map(|r| r.key().clone())
                .filter(|key| !reported.contains(key.as_str()))
                .collect();
            for key in stale {
                self.cache.remove(&key);
                self.subscribers.notify(&key, None);
            }
        }

        crate::metrics::set_cache_entries(self.cache.len());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::config::{LocalStateConfig, ReconcilePolicy};
    use crate::storage::testing::FailingBackend;
    use crate::storage::{MemoryBackend, StateBackend};
    use crate::sync_state::{LoadState, SyncState};

    fn loading_log(state: &SyncState) -> Arc<Mutex<Vec<bool>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_in = log.clone();
        state.subscribe_loading(move |loading| log_in.lock().push(loading));
        log
    }

    #[tokio::test]
    async fn test_initial_state_is_idle_and_not_loading() {
        let state = SyncState::new(Arc::new(MemoryBackend::new()));
        assert_eq!(state.load_state(), LoadState::Idle);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_load_populates_cache() {
        let backend = MemoryBackend::with_entries([("a", json!(1)), ("b", json!(2))]);
        let state = SyncState::new(Arc::new(backend));

        state.load(false).await.unwrap();
        assert!(!state.is_loading());
        assert_eq!(state.load_state(), LoadState::Loaded);
        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("b"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_loading_signal_true_then_false() {
        let state = SyncState::new(Arc::new(MemoryBackend::new()));
        let log = loading_log(&state);

        state.load(false).await.unwrap();
        assert_eq!(*log.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_loading_callback_observes_loading_state() {
        let state = Arc::new(SyncState::new(Arc::new(MemoryBackend::new())));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_in = observed.clone();
        let state_in = Arc::downgrade(&state);
        state.subscribe_loading(move |_| {
            if let Some(state) = state_in.upgrade() {
                observed_in.lock().push(state.is_loading());
            }
        });

        state.load(false).await.unwrap();
        assert_eq!(*observed.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_load_notifies_each_key() {
        let backend = MemoryBackend::with_entries([("a", json!("x"))]);
        let state = SyncState::new(Arc::new(backend));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        state.subscribe("a", move |value| seen_in.lock().push(value.cloned()));

        state.load(false).await.unwrap();
        assert_eq!(*seen.lock(), vec![Some(json!("x"))]);
    }

    #[tokio::test]
    async fn test_reload_runs_when_not_loading() {
        let backend = Arc::new(FailingBackend::with_entries([("a", json!(1))]));
        let state = SyncState::new(backend.clone());

        state.load(false).await.unwrap();
        backend.inner.set("a", &json!(2)).await.unwrap();
        state.load(false).await.unwrap();

        assert_eq!(backend.list_count.load(Ordering::SeqCst), 2);
        assert_eq!(state.get("a"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_ensure_loaded_only_loads_once() {
        let backend = Arc::new(FailingBackend::with_entries([("a", json!(1))]));
        let state = SyncState::new(backend.clone());

        state.ensure_loaded().await.unwrap();
        state.ensure_loaded().await.unwrap();
        assert_eq!(backend.list_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retain_keeps_out_of_band_removed_keys() {
        let backend = Arc::new(MemoryBackend::with_entries([("a", json!(1)), ("b", json!(2))]));
        let state = SyncState::new(backend.clone());
        state.load(false).await.unwrap();

        backend.remove("b").await.unwrap();
        state.load(true).await.unwrap();
        assert_eq!(state.get("b"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_prune_drops_out_of_band_removed_keys() {
        let backend = Arc::new(MemoryBackend::with_entries([("a", json!(1)), ("b", json!(2))]));
        let config = LocalStateConfig {
            reconcile_on_load: ReconcilePolicy::Prune,
            ..Default::default()
        };
        let state = SyncState::with_config(backend.clone(), config);
        state.load(false).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        state.subscribe("b", move |value| seen_in.lock().push(value.cloned()));

        backend.remove("b").await.unwrap();
        state.load(true).await.unwrap();
        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("b"), None);
        assert_eq!(*seen.lock(), vec![None]);
    }

    #[tokio::test]
    async fn test_batched_load_reads_in_chunks() {
        let entries = (0..10).map(|i| (format!("k{}", i), json!(i)));
        let backend = Arc::new(FailingBackend::with_entries(entries));
        let config = LocalStateConfig {
            load_batch_size: 3,
            ..Default::default()
        };
        let state = SyncState::with_config(backend.clone(), config);

        state.load(false).await.unwrap();
        assert_eq!(backend.multi_get_count.load(Ordering::SeqCst), 4);
        assert_eq!(state.len(), 10);
        assert_eq!(state.get("k7"), Some(json!(7)));
    }

    #[tokio::test]
    async fn test_failed_first_load_returns_to_idle() {
        let backend = Arc::new(FailingBackend::with_entries([("a", json!(1))]));
        backend.set_fail_list(true);
        let state = SyncState::new(backend.clone());
        let log = loading_log(&state);

        let err = state.load(false).await.unwrap_err();
        assert!(err.is_backend());
        assert_eq!(state.load_state(), LoadState::Idle);
        assert_eq!(*log.lock(), vec![true, false]);

        backend.set_fail_list(false);
        state.load(false).await.unwrap();
        assert_eq!(state.get("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_loaded_cache() {
        let backend = Arc::new(FailingBackend::with_entries([("a", json!(1))]));
        let state = SyncState::new(backend.clone());
        state.load(false).await.unwrap();

        backend.set_fail_get(true);
        assert!(state.load(true).await.is_err());
        assert_eq!(state.load_state(), LoadState::Loaded);
        assert_eq!(state.get("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_state_receiver_sees_loaded() {
        let state = SyncState::new(Arc::new(MemoryBackend::new()));
        let mut rx = state.state_receiver();
        assert_eq!(*rx.borrow(), LoadState::Idle);

        state.load(false).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_wait_loaded_resolves_after_load() {
        let state = SyncState::new(Arc::new(MemoryBackend::new()));

        let ((), loaded) = tokio::join!(state.wait_loaded(), state.load(false));
        loaded.unwrap();
        assert_eq!(state.load_state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_unsubscribe_loading_unknown_handle() {
        let state = SyncState::new(Arc::new(MemoryBackend::new()));
        let handle = state.subscribe_loading(|_| {});
        state.unsubscribe_loading(handle).unwrap();

        let err = state.unsubscribe_loading(handle).unwrap_err();
        assert!(err.is_not_found());
    }
}
