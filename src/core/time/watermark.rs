// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Watermark Tracking
//!
//! The watermark asserts that no record older than it is still expected:
//!
//! ```text
//! watermark = max(event_time observed) - allowed_lateness
//! ```
//!
//! It starts at the epoch and never moves backwards. Windows whose end is at
//! or before the watermark are closed and can be finalized.
//!
//! Because the watermark never drops below the epoch, a record is admitted
//! only when `event_time >= -allowed_lateness`. Event times before 1970 are
//! therefore dropped as late unless the lateness reaches back far enough.

use crate::core::query::window::Window;

/// Watermark before any record has been observed, and its floor
pub const EPOCH: i64 = 0;

#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    allowed_lateness_ms: i64,
    max_event_time: Option<i64>,
    current: i64,
}

impl WatermarkTracker {
    pub fn new(allowed_lateness_ms: i64) -> Self {
        Self {
            allowed_lateness_ms: allowed_lateness_ms.max(0),
            max_event_time: None,
            current: EPOCH,
        }
    }

    /// Record an admitted event time and return the (possibly advanced) watermark.
    pub fn observe(&mut self, event_time: i64) -> i64 {
        let max = match self.max_event_time {
            Some(max) if max >= event_time => max,
            _ => event_time,
        };
        self.max_event_time = Some(max);

        let candidate = max.saturating_sub(self.allowed_lateness_ms);
        if candidate > self.current {
            self.current = candidate;
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn max_event_time(&self) -> Option<i64> {
        self.max_event_time
    }

    pub fn allowed_lateness_ms(&self) -> i64 {
        self.allowed_lateness_ms
    }

    /// Oldest event time still admitted: `current() - allowed_lateness`
    #[inline]
    pub fn admission_cutoff(&self) -> i64 {
        self.current.saturating_sub(self.allowed_lateness_ms)
    }

    #[inline]
    pub fn is_too_late(&self, event_time: i64) -> bool {
        event_time < self.admission_cutoff()
    }

    /// A closed window can no longer change and is ready for finalization
    #[inline]
    pub fn is_closed(&self, window: &Window) -> bool {
        window.end <= self.current
    }

    /// Reinstate persisted progress. Never moves the watermark backwards.
    pub fn restore(&mut self, watermark: i64, max_event_time: Option<i64>) {
        self.max_event_time = match (self.max_event_time, max_event_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.current = self.current.max(watermark);
    }
}
