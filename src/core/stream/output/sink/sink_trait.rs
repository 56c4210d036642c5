// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::EngineResult;
use crate::core::query::output::OutputRow;
use std::fmt::Debug;

/// Downstream receiver of aggregate rows.
///
/// A call to [`Sink::emit`] receives the whole emission of one cycle. Returning
/// an error fails that batch as a unit: the engine retries the entire batch and
/// purges no state until a call succeeds, so a sink may see the same rows more
/// than once.
pub trait Sink: Debug + Send + Sync {
    fn start(&self) {}

    fn emit(&self, rows: &[OutputRow]) -> EngineResult<()>;

    fn stop(&self) {}

    /// Verify that the downstream system is reachable before the first cycle.
    ///
    /// Sinks without external dependencies keep the default.
    fn validate_connectivity(&self) -> EngineResult<()> {
        Ok(())
    }
}
