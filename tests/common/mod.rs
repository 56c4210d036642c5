// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use fareflux::core::config::EngineConfig;
use fareflux::core::error::{EngineError, EngineResult};
use fareflux::core::event::{GroupingKey, Record};
use fareflux::core::query::output::OutputRow;
use fareflux::core::stream::input::mapper::parse_timestamp;
use fareflux::core::stream::output::Sink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MINUTE: i64 = 60_000;

/// Fixed 5 minute ride statistics per driver, fast retries
pub const RIDE_STATS: &str = r#"
[engine]
name = "ride-stats"

[window]
mode = "fixed"
length = "5m"

[query]
grouping-keys = ["driver_id"]
measures = ["fare", "distance"]
aggregates = ["sum(fare) as total_fare", "avg(distance) as avg_distance"]

[sink.retry]
max-attempts = 3
backoff = "fixed"
initial-delay = "1ms"
max-delay = "5ms"
"#;

pub fn ride_config() -> EngineConfig {
    EngineConfig::from_toml_str(RIDE_STATS).unwrap()
}

/// [`RIDE_STATS`] with extra `key=value` overrides
pub fn ride_config_with(overrides: &[&str]) -> EngineConfig {
    let overrides: Vec<String> = overrides.iter().map(|s| s.to_string()).collect();
    EngineConfig::load(Some(RIDE_STATS), &overrides).unwrap()
}

/// `"2024-03-01 15:23:45"` as epoch millis
pub fn at(timestamp: &str) -> i64 {
    parse_timestamp(timestamp).unwrap()
}

pub fn ride(timestamp: &str, driver: i64, fare: f64, distance: f64) -> Record {
    Record::new(at(timestamp), GroupingKey::int(driver), vec![fare, distance])
}

pub fn rows_for(rows: &[OutputRow], window_start: i64) -> Vec<OutputRow> {
    rows.iter()
        .filter(|row| row.window_start == window_start)
        .cloned()
        .collect()
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap();
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Sink that rejects its first `failures` batches
#[derive(Debug)]
pub struct FlakySink {
    failures: AtomicUsize,
    pub attempts: Arc<AtomicUsize>,
    pub rows: Arc<Mutex<Vec<OutputRow>>>,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            attempts: Arc::new(AtomicUsize::new(0)),
            rows: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }
}

impl Sink for FlakySink {
    fn emit(&self, rows: &[OutputRow]) -> EngineResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::sink_unavailable("downstream unavailable"));
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}
