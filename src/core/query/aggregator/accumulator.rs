// SPDX-License-Identifier: MIT OR Apache-2.0

use super::function::AggregateFunction;
use serde::{Deserialize, Serialize};

/// Running state sufficient for sum, count, avg, min and max.
///
/// NaN inputs are skipped, so `count` is the number of values folded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Count one occurrence without a value (`count(*)`)
    #[inline]
    pub fn tick(&mut self) {
        self.count += 1;
    }

    /// Result of `function` over the folded values; `None` when undefined
    pub fn result(&self, function: AggregateFunction) -> Option<f64> {
        match function {
            AggregateFunction::Count => Some(self.count as f64),
            AggregateFunction::Sum => Some(self.sum),
            AggregateFunction::Avg if self.count > 0 => Some(self.sum / self.count as f64),
            AggregateFunction::Min if self.count > 0 => Some(self.min),
            AggregateFunction::Max if self.count > 0 => Some(self.max),
            _ => None,
        }
    }

    /// Internal consistency check used when restoring persisted state.
    ///
    /// An infinite sum is legal: finite fares can overflow `f64`. NaN is not,
    /// since NaN inputs never reach the sum.
    pub fn check(&self, counts_values: bool) -> Result<(), String> {
        if self.sum.is_nan() {
            return Err("sum is NaN".to_string());
        }
        if counts_values && self.count > 0 && self.min > self.max {
            return Err(format!("min {} exceeds max {}", self.min, self.max));
        }
        if counts_values && self.count == 0 && self.sum != 0.0 {
            return Err(format!("sum {} recorded without values", self.sum));
        }
        Ok(())
    }
}
