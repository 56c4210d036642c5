// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod json_lines_source;

use crate::core::error::EngineResult;
use crate::core::event::Record;
use std::fmt::Debug;
use std::time::Duration;

/// Ingestion side of the engine.
///
/// Sources deliver records in arbitrary event-time order and may replay
/// records after a failure. Replays are recognised by `Record::offset`, which a
/// source must assign in increasing delivery order.
pub trait RecordSource: Debug + Send {
    /// Pull every record currently available.
    ///
    /// Waits up to `timeout` for the first record when nothing is buffered;
    /// `None` returns immediately. An empty batch is not an error.
    fn next_batch(&mut self, timeout: Option<Duration>) -> EngineResult<Vec<Record>>;

    /// True once no further records will ever be delivered
    fn is_exhausted(&self) -> bool;

    fn stop(&mut self) {}

    /// Verify that the upstream system is reachable before the first cycle.
    fn validate_connectivity(&self) -> EngineResult<()> {
        Ok(())
    }
}
