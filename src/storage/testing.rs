// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! A backend that can be configured to fail on demand.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::memory::MemoryBackend;
use super::traits::{StateBackend, StorageError, ValueMap};

#[derive(Default)]
pub(crate) struct FailingBackend {
    pub(crate) inner: MemoryBackend,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_get: AtomicBool,
    pub(crate) fail_set: AtomicBool,
    pub(crate) fail_remove: AtomicBool,
    pub(crate) list_count: AtomicUsize,
    pub(crate) multi_get_count: AtomicUsize,
    pub(crate) set_count: AtomicUsize,
    pub(crate) remove_count: AtomicUsize,
}

impl FailingBackend {
    pub(crate) fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: MemoryBackend::with_entries(entries),
            ..Self::default()
        }
    }

    pub(crate) fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("Mock {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl StateBackend for FailingBackend {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_list, "list")?;
        self.inner.list().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Self::check(&self.fail_get, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.set_count.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_set, "set")?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_count.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_remove, "remove")?;
        self.inner.remove(key).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StorageError> {
        self.multi_get_count.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_get, "multi_get")?;
        self.inner.multi_get(keys).await
    }
}
