// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the synchronous engine.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::storage::StorageError;

/// Loading life-cycle of the cache.
///
/// Use [`super::SyncState::load_state()`] to check the current state or
/// [`super::SyncState::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Never loaded; the cache only holds local writes
    Idle,
    /// Bulk load in progress; reads may be stale or absent
    Loading,
    /// Cache mirrors the backend as of the last load
    Loaded,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Loaded => write!(f, "Loaded"),
        }
    }
}

/// Bookkeeping for overlapping loads: the state leaves `Loading` only when
/// the last in-flight load ends.
#[derive(Debug)]
pub(super) struct LoadTracker {
    pub(super) in_flight: usize,
    /// State to publish once `in_flight` drops back to zero
    pub(super) settle_to: LoadState,
}

impl LoadTracker {
    pub(super) fn new() -> Self {
        Self {
            in_flight: 0,
            settle_to: LoadState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WriteOp {
    Set,
    Remove,
}

impl WriteOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Remove => "remove",
        }
    }
}

pub(super) type BackendWrite = Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'static>>;

/// Backend half of an optimistic write.
///
/// By the time this exists, the cache already holds the new value and
/// subscribers have been told. Awaiting it performs the backend write and
/// yields the backend's verdict. A failure does NOT roll the cache back:
/// until the caller reacts, the cache is ahead of the backend.
///
/// Dropping it before the write has completed detaches the rest of the
/// write onto the current tokio runtime, as [`PendingWrite::detach`] does.
/// Outside a runtime the write cannot run; that is logged and counted as a
/// failed detached write.
#[must_use = "await the write to observe the backend's verdict; dropping it detaches the write"]
pub struct PendingWrite {
    key: String,
    op: WriteOp,
    /// `None` once the write has completed or been handed to a task
    write: Option<BackendWrite>,
}

impl PendingWrite {
    pub(super) fn new(key: String, op: WriteOp, write: BackendWrite) -> Self {
        Self {
            key,
            op,
            write: Some(write),
        }
    }

    /// Key this write targets.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the backend write on the current tokio runtime.
    ///
    /// Failures are logged and counted as well as returned through the
    /// handle. Panics when called outside a tokio runtime.
    pub fn detach(mut self) -> JoinHandle<Result<(), StateError>> {
        let write = self.write.take();
        tokio::spawn(run_detached(self.key.clone(), self.op, write))
    }
}

async fn run_detached(key: String, op: WriteOp, write: Option<BackendWrite>) -> Result<(), StateError> {
    let Some(write) = write else {
        return Ok(());
    };
    let result = write.await.map_err(StateError::from);
    if let Err(ref e) = result {
        warn!(key = %key, operation = op.as_str(), error = %e, "Detached write failed; cache is ahead of backend");
        crate::metrics::record_detached_write_failure(op.as_str());
    }
    result
}

impl Future for PendingWrite {
    type Output = Result<(), StateError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(write) = this.write.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(write.as_mut().poll(cx));
        this.write = None;
        Poll::Ready(result.map_err(StateError::from))
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        let Some(write) = self.write.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                debug!(key = %self.key, operation = self.op.as_str(), "Pending write dropped; detaching");
                drop(runtime.spawn(run_detached(self.key.clone(), self.op, Some(write))));
            }
            Err(_) => {
                warn!(
                    key = %self.key,
                    operation = self.op.as_str(),
                    "Pending write dropped outside a tokio runtime; backend write skipped"
                );
                crate::metrics::record_detached_write_failure(self.op.as_str());
            }
        }
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("key", &self.key)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}
