// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Aggregation Engine
//!
//! One engine instance owns the whole windowed aggregation pipeline:
//!
//! ```text
//! records ─▶ replay filter ─▶ WindowAssigner ─▶ AggregationStateStore
//!                                                      │
//!          Sink ◀── EmissionPolicy ◀── WatermarkTracker┘
//! ```
//!
//! [`AggregationEngine::run_cycle`] performs one trigger cycle over a batch of
//! records. Lifecycle: `new(config, sink)` or `restore(..)`, any number of
//! cycles, then `shutdown()`.
//!
//! ## Admission
//!
//! The watermark used for admission is the one from *before* the cycle. A
//! record is dropped when `event_time < watermark - allowed_lateness`. A
//! contribution to a window that is already closed (`end <= watermark`) is
//! dropped as well, so a purged window can never be recreated. A record left
//! with no open window is counted as late, not admitted, and does not move
//! the watermark.
//!
//! ## Delivery
//!
//! Rows go to the sink as one batch, retried whole with backoff. Windows are
//! purged only after the sink accepted the batch. When every attempt fails the
//! engine stops with [`EngineError::SinkWriteFailure`] and keeps the unpurged
//! state, which can still be snapshotted and resumed from.

use crate::core::config::EngineConfig;
use crate::core::error::retry::retry_with_backoff;
use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{GroupingKey, Record};
use crate::core::persistence::{EngineSnapshot, SNAPSHOT_FORMAT_VERSION};
use crate::core::query::aggregator::AggregateSpec;
use crate::core::query::output::{EmissionPolicy, OutputRow};
use crate::core::query::window::{Window, WindowAssigner};
use crate::core::state::AggregationStateStore;
use crate::core::stream::output::Sink;
use crate::core::time::WatermarkTracker;
use crate::core::trigger::TriggerState;
use crate::core::util::{EngineHealthChecker, EngineMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one trigger cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub records_pulled: usize,
    pub duplicates_skipped: usize,
    pub malformed: usize,
    pub late_dropped: usize,
    pub late_contributions_dropped: usize,
    pub unassigned: usize,
    pub admitted: usize,
    pub cells_created: usize,
    pub watermark_before: i64,
    pub watermark: i64,
    pub finalized_windows: Vec<Window>,
    pub rows_emitted: usize,
    pub emit_attempts: usize,
    pub windows_purged: usize,
    pub cells_purged: usize,
}

pub struct AggregationEngine {
    config: EngineConfig,
    assigner: WindowAssigner,
    watermark: WatermarkTracker,
    store: Arc<AggregationStateStore>,
    policy: EmissionPolicy,
    sink: Box<dyn Sink>,
    metrics: Arc<EngineMetrics>,
    failed: Arc<AtomicBool>,
    last_offset: Option<u64>,
    cycle: u64,
    state: TriggerState,
    shut_down: bool,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("name", &self.config.name)
            .field("watermark", &self.watermark.current())
            .field("cycle", &self.cycle)
            .field("state", &self.state)
            .field("sink", &self.sink)
            .finish()
    }
}

impl AggregationEngine {
    pub fn new(config: EngineConfig, sink: Box<dyn Sink>) -> EngineResult<Self> {
        let assigner = WindowAssigner::new(config.window, !config.allow_gaps)?;
        sink.validate_connectivity()?;

        let engine = Self {
            assigner,
            watermark: WatermarkTracker::new(config.allowed_lateness_ms),
            store: Arc::new(AggregationStateStore::new(config.aggregates.clone())),
            policy: EmissionPolicy::new(config.output_mode, config.is_keyed(), &config.aggregates),
            sink,
            metrics: Arc::new(EngineMetrics::new()),
            failed: Arc::new(AtomicBool::new(false)),
            last_offset: None,
            cycle: 0,
            state: TriggerState::Idle,
            shut_down: false,
            config,
        };
        engine.sink.start();
        log::info!(
            "[AggregationEngine] '{}' created: {} window {}ms/{}ms, lateness {}ms, {} output",
            engine.config.name,
            engine.config.window.mode.as_str(),
            engine.config.window.length_ms,
            engine.config.window.slide_ms,
            engine.config.allowed_lateness_ms,
            engine.config.output_mode.as_str()
        );
        Ok(engine)
    }

    /// Resume from a persisted snapshot.
    ///
    /// Fails with [`EngineError::StateCorruption`] when the snapshot is
    /// inconsistent or was taken with a different window geometry or
    /// aggregate list.
    pub fn restore(
        config: EngineConfig,
        sink: Box<dyn Sink>,
        snapshot: EngineSnapshot,
    ) -> EngineResult<Self> {
        snapshot.validate()?;
        if snapshot.window_length_ms != config.window.length_ms
            || snapshot.window_slide_ms != config.window.slide_ms
        {
            return Err(EngineError::state_corruption(format!(
                "snapshot windows are {}ms/{}ms but the engine is configured for {}ms/{}ms",
                snapshot.window_length_ms,
                snapshot.window_slide_ms,
                config.window.length_ms,
                config.window.slide_ms
            )));
        }
        let signature = aggregate_signature(&config.aggregates);
        if snapshot.aggregates != signature {
            return Err(EngineError::state_corruption(format!(
                "snapshot aggregates {:?} do not match configured {:?}",
                snapshot.aggregates, signature
            )));
        }

        let mut engine = Self::new(config, sink)?;
        if let Err(e) = engine.load_snapshot(snapshot) {
            engine.shutdown();
            return Err(e);
        }
        log::info!(
            "[AggregationEngine] '{}' resumed at cycle {}: watermark {}, {} cells, last offset {:?}",
            engine.config.name,
            engine.cycle,
            engine.watermark.current(),
            engine.store.cell_count(),
            engine.last_offset
        );
        Ok(engine)
    }

    fn load_snapshot(&mut self, snapshot: EngineSnapshot) -> EngineResult<()> {
        if let Some(stored) = snapshot
            .cells
            .iter()
            .find(|stored| !self.assigner.is_aligned(&stored.window))
        {
            return Err(EngineError::state_corruption(format!(
                "window {} is not aligned to the configured slide",
                stored.window
            )));
        }
        self.store.import(snapshot.cells);
        self.store.validate().map_err(EngineError::state_corruption)?;

        self.watermark
            .restore(snapshot.watermark, snapshot.max_event_time);
        self.last_offset = snapshot.last_offset;
        self.cycle = snapshot.cycle;
        Ok(())
    }

    /// Run one trigger cycle over `records`.
    ///
    /// An empty batch still advances the cycle and, in complete mode, re-emits
    /// every live cell.
    pub fn run_cycle(&mut self, records: Vec<Record>) -> EngineResult<CycleReport> {
        if self.state.is_terminal() {
            return Err(EngineError::stopped(format!(
                "engine '{}' no longer accepts cycles",
                self.config.name
            )));
        }

        self.cycle += 1;
        let cycle = self.cycle;
        let mut report = CycleReport {
            cycle,
            records_pulled: records.len(),
            watermark_before: self.watermark.current(),
            ..CycleReport::default()
        };
        self.metrics.add_records_ingested(records.len() as u64);

        self.transition(TriggerState::Ingesting);
        let records = self.filter_ingested(records, &mut report);

        self.transition(TriggerState::Assigning);
        let assigned: Vec<(Record, Vec<Window>)> = records
            .into_iter()
            .filter_map(|record| {
                if self.watermark.is_too_late(record.event_time) {
                    report.late_dropped += 1;
                    log::debug!(
                        "[AggregationEngine] dropping late record at {} (cutoff {})",
                        record.event_time,
                        self.watermark.admission_cutoff()
                    );
                    return None;
                }
                let windows = self.assigner.assign(record.event_time);
                if windows.is_empty() {
                    report.unassigned += 1;
                }
                Some((record, windows))
            })
            .collect();

        self.transition(TriggerState::Aggregating);
        let mut admitted_times = Vec::with_capacity(assigned.len());
        for (record, windows) in &assigned {
            let mut applied = 0;
            for window in windows {
                if self.watermark.is_closed(window) {
                    report.late_contributions_dropped += 1;
                    continue;
                }
                if self.store.apply(*window, &record.key, &record.measures, cycle) {
                    report.cells_created += 1;
                }
                applied += 1;
            }
            // every window already closed: the record is late after all
            if applied == 0 && !windows.is_empty() {
                report.late_dropped += 1;
                log::debug!(
                    "[AggregationEngine] dropping record at {}: all its windows are closed",
                    record.event_time
                );
                continue;
            }
            admitted_times.push(record.event_time);
        }
        report.admitted = admitted_times.len();

        self.transition(TriggerState::WatermarkAdvance);
        for event_time in admitted_times {
            self.watermark.observe(event_time);
        }
        report.watermark = self.watermark.current();
        report.finalized_windows = self.store.finalized_windows(report.watermark);

        self.transition(TriggerState::Emitting);
        let plan = self
            .policy
            .plan(&self.store, &report.finalized_windows, cycle);
        if !plan.rows.is_empty() {
            match self.emit(&plan.rows) {
                Ok(attempts) => {
                    report.emit_attempts = attempts;
                    report.rows_emitted = plan.rows.len();
                }
                Err(e) => {
                    self.failed.store(true, Ordering::Relaxed);
                    self.state = TriggerState::Stopped;
                    self.record_metrics(&report);
                    log::error!(
                        "[AggregationEngine] '{}' stopping at cycle {}: {}",
                        self.config.name,
                        cycle,
                        e
                    );
                    return Err(e);
                }
            }
        }
        for window in &plan.purge {
            let purged = self.store.purge(window);
            if purged > 0 {
                report.windows_purged += 1;
                report.cells_purged += purged;
            }
        }

        self.record_metrics(&report);
        self.transition(TriggerState::Idle);

        if report.rows_emitted > 0 || report.late_dropped > 0 {
            log::info!(
                "[AggregationEngine] cycle {}: {} admitted, {} late, watermark {}, {} rows emitted, {} windows purged",
                cycle,
                report.admitted,
                report.late_dropped,
                report.watermark,
                report.rows_emitted,
                report.windows_purged
            );
        } else {
            log::debug!(
                "[AggregationEngine] cycle {}: {} admitted, watermark {}",
                cycle,
                report.admitted,
                report.watermark
            );
        }
        Ok(report)
    }

    /// Drop replays and malformed records, advancing the offset marker.
    ///
    /// The marker moves with the cells it describes, so a snapshot taken after
    /// any cycle, including a failed one, never double counts on resume.
    fn filter_ingested(&mut self, records: Vec<Record>, report: &mut CycleReport) -> Vec<Record> {
        let keyed = self.config.is_keyed();
        let key_arity = self.config.grouping_keys.len();
        let measure_count = self.config.measures.len();

        let mut accepted = Vec::with_capacity(records.len());
        for mut record in records {
            if let Some(offset) = record.offset {
                if self.last_offset.is_some_and(|marker| offset <= marker) {
                    report.duplicates_skipped += 1;
                    continue;
                }
                self.last_offset = Some(offset);
            }
            if (keyed && record.key.arity() != key_arity) || record.measures.len() != measure_count {
                report.malformed += 1;
                log::warn!(
                    "[AggregationEngine] skipping malformed record: key {} ({} fields expected), {} measures ({} expected)",
                    record.key,
                    key_arity,
                    record.measures.len(),
                    measure_count
                );
                continue;
            }
            // NaN marks a missing measure; infinities are never valid input
            if record.measures.iter().any(|m| m.is_infinite()) {
                report.malformed += 1;
                log::warn!(
                    "[AggregationEngine] skipping record at {} with an infinite measure",
                    record.event_time
                );
                continue;
            }
            if !keyed {
                record.key = GroupingKey::global();
            }
            accepted.push(record);
        }
        accepted
    }

    /// Emit one batch with whole-batch retries, returning the attempts used
    fn emit(&self, rows: &[OutputRow]) -> EngineResult<usize> {
        let metrics = Arc::clone(&self.metrics);
        let sink = &self.sink;
        let mut attempts = 0;
        let result = retry_with_backoff(
            &self.config.retry,
            |attempt| {
                attempts = attempt;
                sink.emit(rows)
            },
            |attempt, e| {
                metrics.add_sink_failures(1);
                metrics.set_pending_retries(attempt as u64);
                log::warn!(
                    "[AggregationEngine] sink rejected {} rows (attempt {}): {}",
                    rows.len(),
                    attempt,
                    e
                );
            },
        );
        self.metrics.set_pending_retries(0);
        result.map(|()| attempts)
    }

    fn record_metrics(&self, report: &CycleReport) {
        let m = &self.metrics;
        m.add_cycles(1);
        m.add_duplicate_records_skipped(report.duplicates_skipped as u64);
        m.add_malformed_records(report.malformed as u64);
        m.add_late_records_dropped(report.late_dropped as u64);
        m.add_late_contributions_dropped(report.late_contributions_dropped as u64);
        m.add_unassigned_records(report.unassigned as u64);
        m.add_records_admitted(report.admitted as u64);
        m.add_rows_emitted(report.rows_emitted as u64);
        m.add_windows_purged(report.windows_purged as u64);
    }

    fn transition(&mut self, next: TriggerState) {
        log::trace!("[AggregationEngine] {} -> {}", self.state, next);
        self.state = next;
    }

    /// Capture the state needed to resume this engine
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_FORMAT_VERSION,
            engine_name: self.config.name.clone(),
            window_length_ms: self.config.window.length_ms,
            window_slide_ms: self.config.window.slide_ms,
            aggregates: aggregate_signature(&self.config.aggregates),
            watermark: self.watermark.current(),
            max_event_time: self.watermark.max_event_time(),
            last_offset: self.last_offset,
            cycle: self.cycle,
            cells: self.store.export(),
        }
    }

    /// Stop the engine. No further cycles are accepted.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.state = TriggerState::Stopped;
        self.sink.stop();
        log::info!(
            "[AggregationEngine] '{}' shutdown after {} cycles ({} live cells)",
            self.config.name,
            self.cycle,
            self.store.cell_count()
        );
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn watermark(&self) -> i64 {
        self.watermark.current()
    }

    pub fn max_event_time(&self) -> Option<i64> {
        self.watermark.max_event_time()
    }

    pub fn last_offset(&self) -> Option<u64> {
        self.last_offset
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn store(&self) -> &Arc<AggregationStateStore> {
        &self.store
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn health_checker(&self) -> EngineHealthChecker {
        EngineHealthChecker::new(
            self.config.name.clone(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.failed),
        )
    }
}

fn aggregate_signature(aggregates: &[AggregateSpec]) -> Vec<String> {
    aggregates
        .iter()
        .map(|a| format!("{}:{}", a.function.as_str(), a.alias))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::output::OutputMode;
    use crate::core::stream::output::LogSink;

    const MINUTE: i64 = 60_000;

    fn config(toml_text: &str) -> EngineConfig {
        EngineConfig::from_toml_str(toml_text).unwrap()
    }

    fn keyed_config() -> EngineConfig {
        config(
            r#"
            [window]
            length = "5m"
            [query]
            grouping-keys = ["driver_id"]
            measures = ["fare", "distance"]
            aggregates = ["sum(fare) as total_fare", "avg(distance) as avg_distance"]
            "#,
        )
    }

    fn ride(t: i64, driver: i64, fare: f64) -> Record {
        Record::new(t, GroupingKey::int(driver), vec![fare, 1.0])
    }

    #[test]
    fn test_cycle_walks_through_phases_back_to_idle() {
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        assert_eq!(engine.state(), TriggerState::Idle);
        let report = engine.run_cycle(vec![ride(MINUTE, 1, 10.0)]).unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.cells_created, 1);
        assert_eq!(engine.state(), TriggerState::Idle);
        assert_eq!(engine.watermark(), MINUTE);
    }

    #[test]
    fn test_admission_uses_watermark_from_before_the_cycle() {
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        // same batch: the later record cannot make the earlier one late
        let report = engine
            .run_cycle(vec![ride(20 * MINUTE, 1, 1.0), ride(MINUTE, 2, 1.0)])
            .unwrap();
        assert_eq!(report.late_dropped, 0);
        assert_eq!(report.admitted, 2);

        let report = engine.run_cycle(vec![ride(MINUTE, 3, 1.0)]).unwrap();
        assert_eq!(report.late_dropped, 1);
        assert!(!engine.store().contains(&Window::new(0, 5 * MINUTE), &GroupingKey::int(3)));
    }

    #[test]
    fn test_replayed_offsets_are_skipped() {
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        engine
            .run_cycle(vec![ride(MINUTE, 1, 10.0).with_offset(1), ride(MINUTE, 1, 5.0).with_offset(2)])
            .unwrap();
        let report = engine
            .run_cycle(vec![ride(MINUTE, 1, 5.0).with_offset(2), ride(MINUTE, 1, 1.0).with_offset(3)])
            .unwrap();
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(engine.last_offset(), Some(3));

        let values = engine.store().snapshot(&Window::new(0, 5 * MINUTE));
        assert_eq!(values[0].1[0], Some(16.0));
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        let report = engine
            .run_cycle(vec![
                Record::new(MINUTE, GroupingKey::global(), vec![1.0, 1.0]),
                Record::new(MINUTE, GroupingKey::int(1), vec![1.0]),
            ])
            .unwrap();
        assert_eq!(report.malformed, 2);
        assert!(engine.store().is_empty());
        assert_eq!(engine.metrics().malformed_records(), 2);
    }

    #[test]
    fn test_unkeyed_query_ignores_record_keys() {
        let mut engine = AggregationEngine::new(
            config("[query]\nmeasures = [\"fare\"]\naggregates = [\"sum(fare) as total\"]\n"),
            Box::new(LogSink::new()),
        )
        .unwrap();
        engine
            .run_cycle(vec![
                Record::new(MINUTE, GroupingKey::int(1), vec![1.0]),
                Record::new(MINUTE, GroupingKey::str("x"), vec![2.0]),
            ])
            .unwrap();
        assert_eq!(engine.store().cell_count(), 1);
        assert!(engine
            .store()
            .contains(&Window::new(0, 5 * MINUTE), &GroupingKey::global()));
    }

    #[test]
    fn test_shutdown_rejects_further_cycles() {
        let sink = LogSink::new();
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(sink)).unwrap();
        engine.shutdown();
        engine.shutdown();
        assert!(engine.is_stopped());
        assert!(matches!(engine.run_cycle(Vec::new()), Err(EngineError::Stopped { .. })));
    }

    #[test]
    fn test_restore_rejects_mismatched_geometry() {
        let engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        let snapshot = engine.snapshot();

        let mut other = keyed_config();
        other.window.length_ms = 10 * MINUTE;
        other.window.slide_ms = 10 * MINUTE;
        assert!(matches!(
            AggregationEngine::restore(other, Box::new(LogSink::new()), snapshot.clone()),
            Err(EngineError::StateCorruption { .. })
        ));

        let mut reordered = keyed_config();
        reordered.aggregates.reverse();
        assert!(matches!(
            AggregationEngine::restore(reordered, Box::new(LogSink::new()), snapshot),
            Err(EngineError::StateCorruption { .. })
        ));
    }

    #[test]
    fn test_complete_mode_never_purges() {
        let mut cfg = keyed_config();
        cfg.output_mode = OutputMode::Complete;
        let sink = LogSink::new();
        let rows = sink.rows.clone();
        let mut engine = AggregationEngine::new(cfg, Box::new(sink)).unwrap();

        engine.run_cycle(vec![ride(MINUTE, 1, 1.0)]).unwrap();
        let report = engine.run_cycle(vec![ride(20 * MINUTE, 2, 1.0)]).unwrap();
        assert_eq!(report.windows_purged, 0);
        assert_eq!(report.rows_emitted, 2);
        assert_eq!(engine.store().cell_count(), 2);
        assert_eq!(rows.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_record_with_only_closed_windows_counts_as_late() {
        let mut cfg = keyed_config();
        cfg.allowed_lateness_ms = MINUTE;
        let mut engine = AggregationEngine::new(cfg, Box::new(LogSink::new())).unwrap();

        engine.run_cycle(vec![ride(31 * MINUTE + 30_000, 1, 10.0)]).unwrap();
        assert_eq!(engine.watermark(), 30 * MINUTE + 30_000);

        // passes the 29:30 cutoff, but [25:00, 30:00) is already closed
        let report = engine.run_cycle(vec![ride(29 * MINUTE + 40_000, 2, 99.0)]).unwrap();
        assert_eq!(report.late_dropped, 1);
        assert_eq!(report.admitted, 0);
        assert_eq!(report.late_contributions_dropped, 1);
        assert_eq!(report.watermark, 30 * MINUTE + 30_000);
        assert!(!engine.store().contains(&Window::new(25 * MINUTE, 30 * MINUTE), &GroupingKey::int(2)));
        assert_eq!(engine.metrics().records_admitted(), 1);
    }

    #[test]
    fn test_infinite_measures_are_malformed() {
        let mut engine = AggregationEngine::new(keyed_config(), Box::new(LogSink::new())).unwrap();
        let report = engine
            .run_cycle(vec![
                Record::new(MINUTE, GroupingKey::int(1), vec![f64::INFINITY, 1.0]),
                Record::new(MINUTE, GroupingKey::int(2), vec![1.0, f64::NEG_INFINITY]),
                Record::new(MINUTE, GroupingKey::int(3), vec![f64::NAN, 1.0]),
            ])
            .unwrap();
        assert_eq!(report.malformed, 2);
        assert_eq!(report.admitted, 1);
        assert_eq!(engine.store().cell_count(), 1);
    }
}
