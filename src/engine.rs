// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Common surface of the two engines, as consumed by [`crate::projection`]
//! and binding layers.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StateError;
use crate::storage::ValueMap;
use crate::subscribers::{ChangeCallback, SubscriptionHandle};

/// Operating mode of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Cache-backed, non-suspending reads ([`crate::SyncState`])
    Sync,
    /// Cache-free pass-through ([`crate::AsyncState`])
    Async,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

#[async_trait]
pub trait StateEngine: Send + Sync {
    fn mode(&self) -> EngineMode;

    /// Value obtainable without suspending: the cached value in sync mode,
    /// always `None` in async mode.
    fn cached(&self, key: &str) -> Option<Value>;

    async fn multi_get(&self, keys: &[String]) -> Result<ValueMap, StateError>;

    /// Set `key`; resolves once the backend has the value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StateError>;

    /// Remove `key`; resolves once the backend has dropped it.
    async fn remove(&self, key: &str) -> Result<(), StateError>;

    fn subscribe(&self, key: &str, callback: ChangeCallback) -> SubscriptionHandle;

    fn unsubscribe(&self, key: &str, handle: SubscriptionHandle) -> Result<(), StateError>;
}
