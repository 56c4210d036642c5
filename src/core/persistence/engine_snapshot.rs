// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Engine Snapshot
//!
//! Everything needed to resume an engine: watermark progress, every live cell
//! and the last source offset reflected in those cells.
//!
//! ## Encoding
//!
//! ```text
//! +--------+------------------+---------------------+
//! | "FFLX" | SHA-256(payload) | payload (bincode)   |
//! | 4 B    | 32 B             | ...                 |
//! +--------+------------------+---------------------+
//! ```
//!
//! Any mismatch in magic, checksum or decoding is reported as
//! [`EngineError::StateCorruption`].

use crate::core::error::{EngineError, EngineResult};
use crate::core::state::StoredCell;
use crate::core::time::EPOCH;
use crate::core::util::{from_bytes, to_bytes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"FFLX";
const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + CHECKSUM_LEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub engine_name: String,
    pub window_length_ms: i64,
    pub window_slide_ms: i64,
    /// `function:alias` per configured aggregate, in order
    pub aggregates: Vec<String>,
    pub watermark: i64,
    pub max_event_time: Option<i64>,
    /// Highest source offset whose record is reflected in `cells`
    pub last_offset: Option<u64>,
    pub cycle: u64,
    pub cells: Vec<StoredCell>,
}

impl EngineSnapshot {
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        let payload = to_bytes(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&Sha256::digest(&payload));
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode and verify a snapshot produced by [`EngineSnapshot::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(EngineError::state_corruption(
                "snapshot header is missing or unrecognised",
            ));
        }
        let (checksum, payload) = bytes[MAGIC.len()..].split_at(CHECKSUM_LEN);
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(EngineError::state_corruption("snapshot checksum mismatch"));
        }
        let snapshot: EngineSnapshot = from_bytes(payload)
            .map_err(|e| EngineError::state_corruption(format!("undecodable snapshot: {}", e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Structural checks that do not depend on the engine configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(EngineError::state_corruption(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if self.watermark < EPOCH {
            return Err(EngineError::state_corruption(format!(
                "watermark {} precedes the epoch",
                self.watermark
            )));
        }
        if self.window_length_ms <= 0 || self.window_slide_ms <= 0 {
            return Err(EngineError::state_corruption(
                "snapshot window geometry is not positive",
            ));
        }
        let mut seen = HashSet::with_capacity(self.cells.len());
        for stored in &self.cells {
            if stored.window.end.checked_sub(stored.window.start) != Some(self.window_length_ms) {
                return Err(EngineError::state_corruption(format!(
                    "cell window {} does not match the window length {}ms",
                    stored.window, self.window_length_ms
                )));
            }
            if !seen.insert((stored.window, &stored.key)) {
                return Err(EngineError::state_corruption(format!(
                    "duplicate cell for window {} key {}",
                    stored.window, stored.key
                )));
            }
        }
        Ok(())
    }
}
