// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Window Assignment
//!
//! Maps an event time to the epoch-aligned windows containing it.
//!
//! ```text
//! length: 5 min, slide: 1 min
//!
//! [15:19, 15:24)
//!    [15:20, 15:25)
//!       [15:21, 15:26)
//!          [15:22, 15:27)
//!             [15:23, 15:28)
//!
//! an event at 15:23:45 belongs to all five windows
//! ```
//!
//! A fixed window is a sliding window whose slide equals its length, so both
//! modes share one assignment routine.

use super::types::{Window, WindowMode};
use crate::core::error::{EngineError, EngineResult};
use std::time::Duration;

pub const WINDOW_LENGTH_KEY: &str = "window.length";
pub const WINDOW_SLIDE_KEY: &str = "window.slide";

/// Window geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub mode: WindowMode,
    pub length_ms: i64,
    pub slide_ms: i64,
}

impl WindowSpec {
    pub fn fixed(length: Duration) -> Self {
        let length_ms = duration_to_millis(length);
        Self {
            mode: WindowMode::Fixed,
            length_ms,
            slide_ms: length_ms,
        }
    }

    pub fn sliding(length: Duration, slide: Duration) -> Self {
        Self {
            mode: WindowMode::Sliding,
            length_ms: duration_to_millis(length),
            slide_ms: duration_to_millis(slide),
        }
    }

    pub fn from_millis(mode: WindowMode, length_ms: i64, slide_ms: i64) -> Self {
        let slide_ms = match mode {
            WindowMode::Fixed => length_ms,
            WindowMode::Sliding => slide_ms,
        };
        Self {
            mode,
            length_ms,
            slide_ms,
        }
    }

    /// Check the geometry.
    ///
    /// `require_gapless` rejects a slide longer than the window length, which
    /// would leave event times covered by no window.
    pub fn validate(&self, require_gapless: bool) -> EngineResult<()> {
        if self.length_ms <= 0 {
            return Err(EngineError::configuration_with_key(
                format!("window length must be positive, got {}ms", self.length_ms),
                WINDOW_LENGTH_KEY,
            ));
        }
        if self.slide_ms <= 0 {
            return Err(EngineError::configuration_with_key(
                format!("window slide must be positive, got {}ms", self.slide_ms),
                WINDOW_SLIDE_KEY,
            ));
        }
        if self.mode == WindowMode::Fixed && self.slide_ms != self.length_ms {
            return Err(EngineError::configuration_with_key(
                "fixed windows must slide by exactly their length",
                WINDOW_SLIDE_KEY,
            ));
        }
        if require_gapless && self.slide_ms > self.length_ms {
            return Err(EngineError::configuration_with_key(
                format!(
                    "slide ({}ms) exceeds window length ({}ms); windows would leave gaps",
                    self.slide_ms, self.length_ms
                ),
                WINDOW_SLIDE_KEY,
            ));
        }
        Ok(())
    }

    /// Number of windows an event belongs to in the steady state
    pub fn windows_per_event(&self) -> usize {
        if self.slide_ms > self.length_ms {
            return 1;
        }
        usize::try_from((self.length_ms + self.slide_ms - 1) / self.slide_ms).unwrap_or(usize::MAX)
    }
}

fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct WindowAssigner {
    spec: WindowSpec,
}

impl WindowAssigner {
    pub fn new(spec: WindowSpec, require_gapless: bool) -> EngineResult<Self> {
        spec.validate(require_gapless)?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Windows containing `event_time`, ordered by start.
    ///
    /// Empty only when gaps are allowed and the event falls between windows.
    pub fn assign(&self, event_time: i64) -> Vec<Window> {
        let slide = self.spec.slide_ms;
        let length = self.spec.length_ms;

        // floor division keeps negative timestamps aligned; whether such a
        // record is admitted is up to the watermark, which floors at the epoch
        let last_start = event_time.div_euclid(slide) * slide;

        let mut windows = Vec::with_capacity(self.spec.windows_per_event());
        let mut start = last_start;
        loop {
            let end = match start.checked_add(length) {
                Some(end) => end,
                None => break,
            };
            if end <= event_time {
                break;
            }
            windows.push(Window::new(start, end));
            start = match start.checked_sub(slide) {
                Some(prev) => prev,
                None => break,
            };
        }

        windows.reverse();
        windows
    }

    /// Whether a stored window has the geometry this assigner produces
    pub fn is_aligned(&self, window: &Window) -> bool {
        window.length() == self.spec.length_ms && window.start.rem_euclid(self.spec.slide_ms) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    #[test]
    fn test_fixed_assigns_exactly_one_window() {
        let assigner =
            WindowAssigner::new(WindowSpec::fixed(Duration::from_secs(300)), true).unwrap();
        let windows = assigner.assign(23 * MINUTE + 45_000);
        assert_eq!(windows, vec![Window::new(20 * MINUTE, 25 * MINUTE)]);
    }

    #[test]
    fn test_fixed_window_boundary_belongs_to_next_window() {
        let assigner =
            WindowAssigner::new(WindowSpec::fixed(Duration::from_secs(300)), true).unwrap();
        assert_eq!(
            assigner.assign(25 * MINUTE),
            vec![Window::new(25 * MINUTE, 30 * MINUTE)]
        );
    }

    #[test]
    fn test_sliding_assigns_overlapping_windows_in_order() {
        let assigner = WindowAssigner::new(
            WindowSpec::sliding(Duration::from_secs(300), Duration::from_secs(60)),
            true,
        )
        .unwrap();
        let t = 23 * MINUTE + 45_000;
        let windows = assigner.assign(t);

        let expected: Vec<Window> = (19..=23)
            .map(|m| Window::new(m * MINUTE, (m + 5) * MINUTE))
            .collect();
        assert_eq!(windows, expected);
        assert!(windows.iter().all(|w| w.contains(t)));
        assert_eq!(windows.len(), assigner.spec().windows_per_event());
    }

    #[test]
    fn test_sliding_with_uneven_slide() {
        // ceil(60 / 25) = 3 windows in the steady state
        let assigner = WindowAssigner::new(
            WindowSpec::sliding(Duration::from_secs(60), Duration::from_secs(25)),
            true,
        )
        .unwrap();
        assert_eq!(assigner.spec().windows_per_event(), 3);

        let windows = assigner.assign(55_000);
        assert_eq!(
            windows,
            vec![
                Window::new(0, 60_000),
                Window::new(25_000, 85_000),
                Window::new(50_000, 110_000),
            ]
        );

        // 60s falls outside [0, 60s) so only two windows contain it
        assert_eq!(assigner.assign(60_000).len(), 2);
    }

    #[test]
    fn test_negative_timestamps_use_floor_alignment() {
        let assigner = WindowAssigner::new(WindowSpec::fixed(Duration::from_secs(10)), true).unwrap();
        assert_eq!(assigner.assign(-1), vec![Window::new(-10_000, 0)]);
        assert_eq!(assigner.assign(-10_000), vec![Window::new(-10_000, 0)]);
    }

    #[test]
    fn test_rejects_non_positive_geometry() {
        let zero_length = WindowSpec::from_millis(WindowMode::Sliding, 0, 1_000);
        assert!(matches!(
            WindowAssigner::new(zero_length, true),
            Err(EngineError::Configuration { .. })
        ));

        let zero_slide = WindowSpec::from_millis(WindowMode::Sliding, 1_000, 0);
        assert!(WindowAssigner::new(zero_slide, true).is_err());

        let negative_slide = WindowSpec::from_millis(WindowMode::Sliding, 1_000, -5);
        assert!(WindowAssigner::new(negative_slide, false).is_err());
    }

    #[test]
    fn test_slide_longer_than_length_requires_gaps_allowed() {
        let spec = WindowSpec::sliding(Duration::from_secs(60), Duration::from_secs(120));
        assert!(WindowAssigner::new(spec, true).is_err());

        let assigner = WindowAssigner::new(spec, false).unwrap();
        assert_eq!(assigner.assign(30_000), vec![Window::new(0, 60_000)]);
        assert!(assigner.assign(90_000).is_empty());
    }

    #[test]
    fn test_is_aligned() {
        let assigner = WindowAssigner::new(
            WindowSpec::sliding(Duration::from_secs(300), Duration::from_secs(60)),
            true,
        )
        .unwrap();
        assert!(assigner.is_aligned(&Window::new(19 * MINUTE, 24 * MINUTE)));
        assert!(!assigner.is_aligned(&Window::new(19 * MINUTE + 1, 24 * MINUTE + 1)));
        assert!(!assigner.is_aligned(&Window::new(19 * MINUTE, 25 * MINUTE)));
    }
}
