// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// Phase of the trigger cycle an engine is in.
///
/// ```text
/// Idle → Ingesting → Assigning → Aggregating → WatermarkAdvance → Emitting → Idle
///                                                                      ↓
///                                                                   Stopped
/// ```
///
/// `Stopped` is terminal; it is reached on shutdown or on a fatal emission
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    Ingesting,
    Assigning,
    Aggregating,
    WatermarkAdvance,
    Emitting,
    Stopped,
}

impl TriggerState {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Idle => "idle",
            TriggerState::Ingesting => "ingesting",
            TriggerState::Assigning => "assigning",
            TriggerState::Aggregating => "aggregating",
            TriggerState::WatermarkAdvance => "watermark-advance",
            TriggerState::Emitting => "emitting",
            TriggerState::Stopped => "stopped",
        }
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TriggerState::Stopped)
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
