// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::query::aggregator::{Accumulator, AggregateSpec};
use serde::{Deserialize, Serialize};

/// Aggregate results of one cell, in the order of the configured aggregates
pub type AggregateValues = Vec<Option<f64>>;

/// Accumulated state of one `(window, key)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCell {
    accumulators: Vec<Accumulator>,
    records: u64,
    last_updated_cycle: u64,
}

impl AggregateCell {
    pub fn new(aggregate_count: usize) -> Self {
        Self {
            accumulators: vec![Accumulator::new(); aggregate_count],
            records: 0,
            last_updated_cycle: 0,
        }
    }

    /// Fold one record's measures into every accumulator.
    ///
    /// A missing measure is skipped like a NaN value.
    pub fn apply(&mut self, aggregates: &[AggregateSpec], measures: &[f64], cycle: u64) {
        for (acc, spec) in self.accumulators.iter_mut().zip(aggregates) {
            match spec.measure_index {
                None => acc.tick(),
                Some(index) => {
                    if let Some(value) = measures.get(index) {
                        acc.add(*value);
                    }
                }
            }
        }
        self.records += 1;
        self.last_updated_cycle = cycle;
    }

    pub fn values(&self, aggregates: &[AggregateSpec]) -> AggregateValues {
        self.accumulators
            .iter()
            .zip(aggregates)
            .map(|(acc, spec)| acc.result(spec.function))
            .collect()
    }

    /// Number of records folded into this cell
    pub fn record_count(&self) -> u64 {
        self.records
    }

    pub fn last_updated_cycle(&self) -> u64 {
        self.last_updated_cycle
    }

    pub fn accumulators(&self) -> &[Accumulator] {
        &self.accumulators
    }

    pub fn check(&self, aggregates: &[AggregateSpec]) -> Result<(), String> {
        if self.records == 0 {
            return Err("cell holds no records".to_string());
        }
        if self.accumulators.len() != aggregates.len() {
            return Err(format!(
                "cell has {} accumulators but {} aggregates are configured",
                self.accumulators.len(),
                aggregates.len()
            ));
        }
        for (acc, spec) in self.accumulators.iter().zip(aggregates) {
            if acc.count > self.records {
                return Err(format!(
                    "'{}' counted {} values out of {} records",
                    spec.alias, acc.count, self.records
                ));
            }
            acc.check(spec.measure_index.is_some())
                .map_err(|e| format!("'{}': {}", spec.alias, e))?;
        }
        Ok(())
    }
}
