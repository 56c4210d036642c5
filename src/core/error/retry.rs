// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry configuration and backoff strategies for sink emission.
//!
//! A failed emission is retried as a whole batch. Delays between attempts follow
//! an exponential, linear or fixed backoff, capped at `max_delay`.

use crate::core::config::FlatConfig;
use crate::core::error::{EngineError, EngineResult};
use std::time::Duration;

pub const RETRY_MAX_ATTEMPTS_KEY: &str = "sink.retry.max-attempts";
pub const RETRY_BACKOFF_KEY: &str = "sink.retry.backoff";
pub const RETRY_INITIAL_DELAY_KEY: &str = "sink.retry.initial-delay";
pub const RETRY_MAX_DELAY_KEY: &str = "sink.retry.max-delay";

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackoffStrategy {
    /// delay = initial_delay * 2^(attempt-1)
    ///
    /// Example: 100ms, 200ms, 400ms, 800ms, 1.6s, ...
    #[default]
    Exponential,

    /// delay = initial_delay * attempt
    Linear,

    /// delay = initial_delay
    Fixed,
}

impl BackoffStrategy {
    /// Parse backoff strategy from string (case-insensitive)
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "exponential" => Ok(BackoffStrategy::Exponential),
            "linear" => Ok(BackoffStrategy::Linear),
            "fixed" => Ok(BackoffStrategy::Fixed),
            _ => Err(EngineError::invalid_parameter_with_details(
                format!("Invalid backoff strategy '{}'", s),
                RETRY_BACKOFF_KEY,
                "'exponential', 'linear' or 'fixed'",
            )),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Fixed => "fixed",
        }
    }
}

/// Retry configuration for whole-batch sink emission
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of emission attempts per cycle, including the first one
    pub max_attempts: usize,

    pub backoff: BackoffStrategy,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn new(
        max_attempts: usize,
        backoff: BackoffStrategy,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> EngineResult<Self> {
        let config = Self {
            max_attempts,
            backoff,
            initial_delay,
            max_delay,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse retry configuration from FlatConfig
    ///
    /// Missing keys fall back to the defaults of [`RetryConfig::default`].
    pub fn from_flat_config(config: &FlatConfig) -> EngineResult<Self> {
        let defaults = RetryConfig::default();

        let max_attempts = config
            .get(RETRY_MAX_ATTEMPTS_KEY)
            .map(|s| {
                s.trim().parse::<usize>().map_err(|_| {
                    EngineError::configuration_with_key(
                        format!("'{}' is not a positive integer", s),
                        RETRY_MAX_ATTEMPTS_KEY,
                    )
                })
            })
            .transpose()?
            .unwrap_or(defaults.max_attempts);

        let backoff = config
            .get(RETRY_BACKOFF_KEY)
            .map(|s| BackoffStrategy::parse(s))
            .transpose()?
            .unwrap_or(defaults.backoff);

        let initial_delay = config
            .get(RETRY_INITIAL_DELAY_KEY)
            .map(|s| parse_duration_for_key(s, RETRY_INITIAL_DELAY_KEY))
            .transpose()?
            .unwrap_or(defaults.initial_delay);

        let max_delay = config
            .get(RETRY_MAX_DELAY_KEY)
            .map(|s| parse_duration_for_key(s, RETRY_MAX_DELAY_KEY))
            .transpose()?
            .unwrap_or(defaults.max_delay);

        Self::new(max_attempts, backoff, initial_delay, max_delay)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::configuration_with_key(
                "max-attempts must be greater than 0",
                RETRY_MAX_ATTEMPTS_KEY,
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(EngineError::configuration_with_key(
                "initial-delay cannot be greater than max-delay",
                RETRY_INITIAL_DELAY_KEY,
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        calculate_backoff(attempt, self)
    }
}

impl Default for RetryConfig {
    /// 3 attempts, exponential backoff, 100ms initial delay, 30s max delay
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Formula: delay = min(initial_delay * 2^(attempt-1), max_delay)
pub fn exponential_backoff(
    attempt: usize,
    initial_delay: Duration,
    max_delay: Duration,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let multiplier = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = (initial_delay.as_millis() as u64).saturating_mul(multiplier);

    Duration::from_millis(delay_ms).min(max_delay)
}

/// Formula: delay = min(initial_delay * attempt, max_delay)
pub fn linear_backoff(attempt: usize, initial_delay: Duration, max_delay: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    initial_delay
        .saturating_mul(attempt as u32)
        .min(max_delay)
}

pub fn calculate_backoff(attempt: usize, config: &RetryConfig) -> Duration {
    match config.backoff {
        BackoffStrategy::Exponential => {
            exponential_backoff(attempt, config.initial_delay, config.max_delay)
        }
        BackoffStrategy::Linear => linear_backoff(attempt, config.initial_delay, config.max_delay),
        BackoffStrategy::Fixed => config.initial_delay,
    }
}

/// Run `operation` until it succeeds or `max_attempts` is reached.
///
/// Every error counts as a failed attempt. Once the attempts are exhausted the
/// last error is escalated to [`EngineError::SinkWriteFailure`]. `on_failure` is
/// invoked after each failed attempt, before sleeping.
pub fn retry_with_backoff<T>(
    config: &RetryConfig,
    mut operation: impl FnMut(usize) -> EngineResult<T>,
    mut on_failure: impl FnMut(usize, &EngineError),
) -> EngineResult<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                on_failure(attempt, &e);
                if attempt >= config.max_attempts {
                    return Err(EngineError::sink_write_failure(e.to_string(), attempt));
                }
                let delay = config.calculate_delay(attempt);
                log::warn!(
                    "[Retry] attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    config.max_attempts,
                    e,
                    delay
                );
                std::thread::sleep(delay);
            }
        }
    }
}

/// Parse duration from string
///
/// Supports "250ms", "1s", "5m" and bare numbers (milliseconds).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if let Some(stripped) = s.strip_suffix("ms") {
        let millis = stripped
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid duration '{}': expected number before 'ms'", s))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(stripped) = s.strip_suffix('s') {
        let secs = stripped
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid duration '{}': expected number before 's'", s))?;
        return Ok(Duration::from_secs(secs));
    }

    if let Some(stripped) = s.strip_suffix('m') {
        let mins = stripped
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid duration '{}': expected number before 'm'", s))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    if let Some(stripped) = s.strip_suffix('h') {
        let hours = stripped
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid duration '{}': expected number before 'h'", s))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    let millis = s.parse::<u64>().map_err(|_| {
        format!(
            "Invalid duration '{}': expected number or duration with suffix (ms, s, m, h)",
            s
        )
    })?;
    Ok(Duration::from_millis(millis))
}

/// [`parse_duration`] reporting failures as configuration errors on `key`
pub fn parse_duration_for_key(s: &str, key: &str) -> EngineResult<Duration> {
    parse_duration(s).map_err(|e| EngineError::configuration_with_key(e, key))
}
