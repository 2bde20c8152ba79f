// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::StorageError;
use crate::subscribers::SubscriptionHandle;

/// Errors surfaced by the state engines.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Trying to unsubscribe from a key \"{key}\" that has no subscribers")]
    NoSubscribers { key: String },

    #[error("Trying to unsubscribe from a key \"{key}\" that has some subscribers but no subscriber with given ID {handle}")]
    UnknownSubscriber {
        key: String,
        handle: SubscriptionHandle,
    },

    #[error("Trying to unsubscribe from a loading callback with invalid subscriber ID {handle}")]
    UnknownLoadingSubscriber { handle: SubscriptionHandle },

    #[error(transparent)]
    Backend(#[from] StorageError),

    #[error("Value for key \"{key}\" does not match its declared type: {source}")]
    Type {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Keys \"{first}\" and \"{second}\" both derive the accessor name \"{name}\"")]
    AccessorCollision {
        name: String,
        first: String,
        second: String,
    },
}

impl StateError {
    /// True for the unsubscribe family: the key has no subscribers, or the
    /// handle is unknown. These always signal a caller bug.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoSubscribers { .. }
                | Self::UnknownSubscriber { .. }
                | Self::UnknownLoadingSubscriber { .. }
        )
    }

    /// True when the error came from the persistence backend.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
