// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the synchronous state engine.
//!
//! # Example
//!
//! ```
//! use local_state::{LocalStateConfig, ReconcilePolicy};
//!
//! // Minimal config (uses defaults)
//! let config = LocalStateConfig::default();
//! assert_eq!(config.reconcile_on_load, ReconcilePolicy::Retain);
//!
//! // Drop cached keys the backend no longer reports, read in chunks of 50
//! let config = LocalStateConfig {
//!     reconcile_on_load: ReconcilePolicy::Prune,
//!     load_batch_size: 50,
//! };
//! ```

use serde::Deserialize;

/// What a load does with cached keys the backend no longer enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Keep their last known value.
    #[default]
    Retain,
    /// Remove them from the cache and notify subscribers with absent.
    Prune,
}

/// Configuration for [`crate::SyncState`].
///
/// All fields have defaults, so an empty document deserializes.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStateConfig {
    /// Handling of cache entries missing from a fresh backend enumeration
    #[serde(default)]
    pub reconcile_on_load: ReconcilePolicy,

    /// Keys per bulk read during load (0 = one read for everything)
    #[serde(default = "default_load_batch_size")]
    pub load_batch_size: usize,
}

fn default_load_batch_size() -> usize { 0 }

impl Default for LocalStateConfig {
    fn default() -> Self {
        Self {
            reconcile_on_load: ReconcilePolicy::default(),
            load_batch_size: default_load_batch_size(),
        }
    }
}
