// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::event::GroupingKey;
use crate::core::query::window::Window;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    pub name: String,
    pub value: Option<f64>,
}

/// One aggregate row handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub window_start: i64,
    pub window_end: i64,
    /// Absent for ungrouped queries
    pub grouping_key: Option<GroupingKey>,
    pub values: Vec<AggregateValue>,
}

impl OutputRow {
    pub fn window(&self) -> Window {
        Window::new(self.window_start, self.window_end)
    }

    /// Value of the aggregate named `name`
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.value)
    }
}

impl fmt::Display for OutputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.window())?;
        if let Some(key) = &self.grouping_key {
            write!(f, " key={}", key)?;
        }
        for value in &self.values {
            match value.value {
                Some(v) => write!(f, " {}={}", value.name, v)?,
                None => write!(f, " {}=null", value.name)?,
            }
        }
        Ok(())
    }
}
