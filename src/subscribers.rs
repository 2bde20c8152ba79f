// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-notification registries.
//!
//! [`SubscriberRegistry`] routes value changes per key; [`LoadingSubscribers`]
//! carries the synchronous engine's loading signal. Both hand out
//! [`SubscriptionHandle`]s from their own counter: strictly increasing,
//! starting at 1, never reused for the lifetime of the registry.
//!
//! Callbacks run synchronously on the notifying call, in registration order.
//! The callback list is snapshotted before delivery, so a callback may
//! subscribe or unsubscribe without deadlocking. A panicking callback is
//! logged and skipped; later callbacks still receive the event.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StateError;

/// Receives the new value of a key, or `None` once the key is removed.
pub type ChangeCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Receives `true` when loading starts and `false` when it ends.
pub type LoadingCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Token returned by `subscribe`, needed to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct HandleCounter(AtomicU64);

impl HandleCounter {
    fn next(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Per-key mapping of handles to change callbacks.
#[derive(Default)]
pub struct SubscriberRegistry {
    handles: HandleCounter,
    by_key: Mutex<HashMap<String, BTreeMap<SubscriptionHandle, ChangeCallback>>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for changes of `key`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let handle = self.handles.next();
        self.by_key
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(handle, Arc::new(callback));
        debug!(key, %handle, "Subscribed");
        handle
    }

    /// Remove a subscription. The key's entry is pruned once its last
    /// subscriber leaves.
    pub fn unsubscribe(&self, key: &str, handle: SubscriptionHandle) -> Result<(), StateError> {
        let mut by_key = self.by_key.lock();
        let callbacks = by_key.get_mut(key).ok_or_else(|| StateError::NoSubscribers {
            key: key.to_string(),
        })?;
        if callbacks.remove(&handle).is_none() {
            return Err(StateError::UnknownSubscriber {
                key: key.to_string(),
                handle,
            });
        }
        if callbacks.is_empty() {
            by_key.remove(key);
        }
        debug!(key, %handle, "Unsubscribed");
        Ok(())
    }

    /// Deliver `value` to every subscriber of `key`, in registration order.
    ///
    /// Returns how many callbacks completed without panicking.
    pub fn notify(&self, key: &str, value: Option<&Value>) -> usize {
        let callbacks: Vec<ChangeCallback> = match self.by_key.lock().get(key) {
            Some(callbacks) => callbacks.values().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for callback in &callbacks {
            if deliver("change", key, || callback(value)) {
                delivered += 1;
            }
        }
        crate::metrics::record_notifications("change", delivered);
        delivered
    }

    /// Number of live subscriptions for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.by_key.lock().get(key).map_or(0, BTreeMap::len)
    }

    /// Number of keys with at least one subscriber.
    #[must_use]
    pub fn watched_keys(&self) -> usize {
        self.by_key.lock().len()
    }
}

/// Key-less registry for the loading life-cycle signal.
#[derive(Default)]
pub struct LoadingSubscribers {
    handles: HandleCounter,
    callbacks: Mutex<BTreeMap<SubscriptionHandle, LoadingCallback>>,
}

impl LoadingSubscribers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let handle = self.handles.next();
        self.callbacks.lock().insert(handle, Arc::new(callback));
        handle
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), StateError> {
        self.callbacks
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or(StateError::UnknownLoadingSubscriber { handle })
    }

    pub fn notify(&self, loading: bool) -> usize {
        let callbacks: Vec<LoadingCallback> = self.callbacks.lock().values().cloned().collect();

        let mut delivered = 0;
        for callback in &callbacks {
            if deliver("loading", "", || callback(loading)) {
                delivered += 1;
            }
        }
        crate::metrics::record_notifications("loading", delivered);
        delivered
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

fn deliver(kind: &'static str, key: &str, call: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(payload) => {
            warn!(kind, key, panic = panic_message(payload.as_ref()), "Subscriber callback panicked");
            crate::metrics::record_subscriber_panic(kind);
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
