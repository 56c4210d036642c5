// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary encoding helpers for persisted state.

use crate::core::error::{EngineError, EngineResult};
use serde::{de::DeserializeOwned, Serialize};

/// Encode `value` with bincode
pub fn to_bytes<T: Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| EngineError::serialization(format!("Failed to serialize: {}", e)))
}

/// Decode a bincode payload produced by [`to_bytes`]
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    bincode::deserialize(bytes)
        .map_err(|e| EngineError::serialization(format!("Failed to deserialize: {}", e)))
}
