// SPDX-License-Identifier: MIT OR Apache-2.0

//! Window Types
//!
//! Window identifiers and the supported window modes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed window: non-overlapping windows that tile the time axis
pub const WINDOW_MODE_FIXED: &str = "fixed";

/// Accepted alias of [`WINDOW_MODE_FIXED`]
pub const WINDOW_MODE_TUMBLING: &str = "tumbling";

/// Sliding window: overlapping windows advancing by the slide interval
pub const WINDOW_MODE_SLIDING: &str = "sliding";

/// Accepted alias of [`WINDOW_MODE_SLIDING`]
pub const WINDOW_MODE_HOPPING: &str = "hopping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowMode {
    #[default]
    Fixed,
    Sliding,
}

impl WindowMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            WINDOW_MODE_FIXED | WINDOW_MODE_TUMBLING => Some(WindowMode::Fixed),
            WINDOW_MODE_SLIDING | WINDOW_MODE_HOPPING => Some(WindowMode::Sliding),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            WindowMode::Fixed => WINDOW_MODE_FIXED,
            WindowMode::Sliding => WINDOW_MODE_SLIDING,
        }
    }
}

/// Half-open event-time interval `[start, end)` in epoch milliseconds.
///
/// Ordering is by start, then end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    #[inline]
    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

fn format_instant(f: &mut fmt::Formatter<'_>, millis: i64) -> fmt::Result {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
        None => write!(f, "{}", millis),
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        format_instant(f, self.start)?;
        write!(f, ", ")?;
        format_instant(f, self.end)?;
        write!(f, ")")
    }
}
