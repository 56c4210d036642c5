// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Emission Policy
//!
//! Decides, once per trigger cycle, which cells are released to the sink and
//! which windows may be purged afterwards.
//!
//! | mode     | rows emitted                                   | purge                    |
//! |----------|------------------------------------------------|--------------------------|
//! | append   | cells of newly finalized windows, exactly once | finalized windows        |
//! | update   | cells mutated this cycle + finalized windows   | finalized windows        |
//! | complete | every live cell, every cycle                   | never                    |
//!
//! Purging is only carried out by the engine after the sink confirmed the
//! whole batch.
//!
//! **Complete mode keeps every cell forever.** Memory grows with the number of
//! distinct (window, key) pairs ever seen. It is unsuitable for unbounded key
//! spaces and for sinks that cannot express a full-table rewrite.

use super::row::{AggregateValue, OutputRow};
use crate::core::error::{EngineError, EngineResult};
use crate::core::event::GroupingKey;
use crate::core::query::aggregator::AggregateSpec;
use crate::core::query::window::Window;
use crate::core::state::{AggregateValues, AggregationStateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OUTPUT_MODE_KEY: &str = "output.mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Append,
    Update,
    Complete,
}

impl OutputMode {
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(OutputMode::Append),
            "update" => Ok(OutputMode::Update),
            "complete" => Ok(OutputMode::Complete),
            _ => Err(EngineError::invalid_parameter_with_details(
                format!("Invalid output mode '{}'", s),
                OUTPUT_MODE_KEY,
                "'append', 'update' or 'complete'",
            )),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Append => "append",
            OutputMode::Update => "update",
            OutputMode::Complete => "complete",
        }
    }

    /// Whether finalized windows are removed from the store
    #[inline]
    pub const fn purges(&self) -> bool {
        !matches!(self, OutputMode::Complete)
    }
}

/// Rows to emit in one cycle and the windows to purge once they are delivered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionPlan {
    pub rows: Vec<OutputRow>,
    pub purge: Vec<Window>,
}

impl EmissionPlan {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.purge.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EmissionPolicy {
    mode: OutputMode,
    keyed: bool,
    aliases: Vec<String>,
}

impl EmissionPolicy {
    /// `keyed` is false for ungrouped queries, whose rows carry no key
    pub fn new(mode: OutputMode, keyed: bool, aggregates: &[AggregateSpec]) -> Self {
        Self {
            mode,
            keyed,
            aliases: aggregates.iter().map(|a| a.alias.clone()).collect(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Select rows for `cycle`.
    ///
    /// `finalized` lists live windows whose end is at or before the new
    /// watermark.
    pub fn plan(
        &self,
        store: &AggregationStateStore,
        finalized: &[Window],
        cycle: u64,
    ) -> EmissionPlan {
        match self.mode {
            OutputMode::Append => {
                let mut rows = Vec::new();
                for window in finalized {
                    for (key, values) in store.snapshot(window) {
                        rows.push(self.row(*window, key, values));
                    }
                }
                EmissionPlan {
                    rows,
                    purge: finalized.to_vec(),
                }
            }
            OutputMode::Update => {
                // a finalized cell mutated this cycle is emitted once, with its final value
                let mut selected: BTreeMap<(Window, GroupingKey), AggregateValues> = BTreeMap::new();
                for (window, key, values) in store.updated_cells(cycle) {
                    selected.insert((window, key), values);
                }
                for window in finalized {
                    for (key, values) in store.snapshot(window) {
                        selected.insert((*window, key), values);
                    }
                }
                EmissionPlan {
                    rows: selected
                        .into_iter()
                        .map(|((window, key), values)| self.row(window, key, values))
                        .collect(),
                    purge: finalized.to_vec(),
                }
            }
            OutputMode::Complete => EmissionPlan {
                rows: store
                    .all_cells()
                    .into_iter()
                    .map(|(window, key, values)| self.row(window, key, values))
                    .collect(),
                purge: Vec::new(),
            },
        }
    }

    fn row(&self, window: Window, key: GroupingKey, values: AggregateValues) -> OutputRow {
        OutputRow {
            window_start: window.start,
            window_end: window.end,
            grouping_key: if self.keyed { Some(key) } else { None },
            values: self
                .aliases
                .iter()
                .zip(values)
                .map(|(name, value)| AggregateValue {
                    name: name.clone(),
                    value,
                })
                .collect(),
        }
    }
}
