// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed keys.
//!
//! A keyspace is declared once, as constants:
//!
//! ```
//! use local_state::StateKey;
//!
//! pub const VOLUME: StateKey<u8> = StateKey::new("volume");
//! pub const MUTED: StateKey<bool> = StateKey::new("muted");
//!
//! assert_eq!(VOLUME.name(), "volume");
//! ```
//!
//! The engines' `get_typed`/`set_typed` then (de)serialize through
//! `serde_json`, so the value type of a key is fixed at compile time.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StateError;

pub struct StateKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

impl<T> AsRef<str> for StateKey<T> {
    fn as_ref(&self) -> &str {
        self.name
    }
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, value: Option<Value>) -> Result<Option<T>, StateError> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(|source| StateError::Type {
            key: key.to_string(),
            source,
        })
}

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, StateError> {
    serde_json::to_value(value).map_err(|source| StateError::Type {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COUNT: StateKey<u32> = StateKey::new("count");

    #[test]
    fn test_decode_absent_is_none() {
        assert_eq!(decode::<u32>(COUNT.name(), None).unwrap(), None);
    }

    #[test]
    fn test_decode_matching_type() {
        assert_eq!(decode::<u32>(COUNT.name(), Some(json!(7))).unwrap(), Some(7));
    }

    #[test]
    fn test_decode_mismatched_type() {
        let err = decode::<u32>(COUNT.name(), Some(json!("seven"))).unwrap_err();
        assert!(matches!(err, StateError::Type { ref key, .. } if key == "count"));
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(COUNT.name(), &3u32).unwrap(), json!(3));
    }

    #[test]
    fn test_key_is_copy_and_debug() {
        let copy = COUNT;
        assert_eq!(format!("{:?}", copy), "StateKey(\"count\")");
        assert_eq!(COUNT.as_ref(), "count");
    }
}
