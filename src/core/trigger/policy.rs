// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{EngineError, EngineResult};
use std::time::Duration;

pub const TRIGGER_MODE_KEY: &str = "trigger.mode";
pub const TRIGGER_INTERVAL_KEY: &str = "trigger.interval";

/// What starts a trigger cycle. Both are processing-time driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    /// A cycle every `interval`, whether or not records arrived
    #[default]
    Interval,
    /// A cycle as soon as records are buffered; `interval` bounds the wait
    OnArrival,
}

impl TriggerMode {
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "interval" | "processing-time" => Ok(TriggerMode::Interval),
            "on-arrival" | "available" => Ok(TriggerMode::OnArrival),
            _ => Err(EngineError::invalid_parameter_with_details(
                format!("Invalid trigger mode '{}'", s),
                TRIGGER_MODE_KEY,
                "'interval' or 'on-arrival'",
            )),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Interval => "interval",
            TriggerMode::OnArrival => "on-arrival",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub mode: TriggerMode,
    pub interval: Duration,
}

impl TriggerPolicy {
    pub fn new(mode: TriggerMode, interval: Duration) -> EngineResult<Self> {
        if interval.is_zero() {
            return Err(EngineError::configuration_with_key(
                "trigger interval must be greater than zero",
                TRIGGER_INTERVAL_KEY,
            ));
        }
        Ok(Self { mode, interval })
    }
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Interval,
            interval: Duration::from_secs(1),
        }
    }
}
