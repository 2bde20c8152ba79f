// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistence backends.
//!
//! The engines only talk to [`traits::StateBackend`]. [`memory`] and [`file`]
//! are ready-made providers; platform storage plugs in by implementing the
//! same trait.

pub mod traits;
pub mod memory;
pub mod file;
#[cfg(test)]
pub(crate) mod testing;

pub use traits::{StateBackend, StorageError, ValueMap};
pub use memory::MemoryBackend;
pub use file::JsonFileBackend;
