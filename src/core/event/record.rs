// SPDX-License-Identifier: MIT OR Apache-2.0

use super::key::GroupingKey;
use serde::{Deserialize, Serialize};

/// An ingested ride event.
///
/// `event_time` is milliseconds since the UNIX epoch. `measures` follow the
/// order of the configured measure fields. `offset` is the position assigned by
/// the source; offsets must increase in delivery order for replay detection to
/// work. Records without an offset are never treated as replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub event_time: i64,
    pub key: GroupingKey,
    pub measures: Vec<f64>,
    pub offset: Option<u64>,
}

impl Record {
    pub fn new(event_time: i64, key: GroupingKey, measures: Vec<f64>) -> Self {
        Self {
            event_time,
            key,
            measures,
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}
