// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{EngineError, EngineResult};
use crate::core::query::output::OutputRow;
use crate::core::stream::output::sink::sink_trait::Sink;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// LogSink - writes rows through the `log` facade and keeps them in memory
///
/// Used by the command line binary and for inspecting output in tests.
#[derive(Debug, Clone)]
pub struct LogSink {
    pub rows: Arc<Mutex<Vec<OutputRow>>>,
    pub prefix: String,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_prefix("[LOG]")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            prefix: prefix.into(),
        }
    }

    /// Copy of every row emitted so far
    pub fn collected(&self) -> Vec<OutputRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

impl Sink for LogSink {
    fn emit(&self, rows: &[OutputRow]) -> EngineResult<()> {
        let mut collected = self
            .rows
            .lock()
            .map_err(|_| EngineError::sink_unavailable("LogSink row buffer is poisoned"))?;
        for row in rows {
            log::info!("{} {}", self.prefix, row);
            collected.push(row.clone());
        }
        Ok(())
    }
}
