// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Local State
//!
//! Key-addressed state shared between application code and a persistent
//! key/value backend, with change notification per key.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Projection                           │
//! │  • value + set<Key> / remove<Key> per key                   │
//! │  • WatchedProjection follows change notifications           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (dyn StateEngine)
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       AsyncState         │   │          SyncState           │
//! │  • reads go to backend   │   │  • DashMap cache, sync reads │
//! │  • notify after write    │   │  • notify before write       │
//! │                          │   │  • Idle → Loading → Loaded   │
//! └──────────────────────────┘   └──────────────────────────────┘
//!              │                               │
//!              └───────────────┬───────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StateBackend                           │
//! │  • list / get / set / remove / multi_get                    │
//! │  • MemoryBackend, JsonFileBackend                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both engines share a [`SubscriberRegistry`]: callbacks run in
//! subscription order, and a panicking callback is logged and skipped
//! without stopping delivery to the rest.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use local_state::{MemoryBackend, SyncState};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), local_state::StateError> {
//! let backend = Arc::new(MemoryBackend::with_entries([("theme", json!("dark"))]));
//! let state = SyncState::new(backend);
//!
//! state.load(false).await?;
//! assert_eq!(state.get("theme"), Some(json!("dark")));
//!
//! state.subscribe("theme", |value| println!("theme is now {value:?}"));
//! state.set("theme", json!("light")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: The backend contract plus memory and JSON-file backends
//! - [`subscribers`]: Per-key and loading subscriber registries
//! - [`async_state`]: Pass-through engine
//! - [`sync_state`]: Cached engine with its loading life-cycle
//! - [`projection`]: Multi-key accessor bundles
//! - [`keys`]: Typed keys
//! - [`metrics`]: Metrics facade helpers

pub mod config;
pub mod error;
pub mod storage;
pub mod subscribers;
pub mod engine;
pub mod keys;
pub mod async_state;
pub mod sync_state;
pub mod projection;
pub mod metrics;

pub use config::{LocalStateConfig, ReconcilePolicy};
pub use error::StateError;
pub use storage::{JsonFileBackend, MemoryBackend, StateBackend, StorageError, ValueMap};
pub use subscribers::{ChangeCallback, LoadingCallback, LoadingSubscribers, SubscriberRegistry, SubscriptionHandle};
pub use engine::{EngineMode, StateEngine};
pub use keys::StateKey;
pub use async_state::AsyncState;
pub use sync_state::{LoadState, PendingWrite, SyncState};
pub use projection::{remover_name, setter_name, KeyAccessor, Projection, WatchedProjection};
