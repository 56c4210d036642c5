// SPDX-License-Identifier: MIT OR Apache-2.0

#[path = "common/mod.rs"]
mod common;

use common::*;
use fareflux::core::error::EngineError;
use fareflux::core::event::GroupingKey;
use fareflux::core::query::window::Window;
use fareflux::core::stream::output::LogSink;
use fareflux::core::trigger::TriggerState;
use fareflux::core::util::{HealthAggregator, HealthChecker, HealthStatus};
use fareflux::core::AggregationEngine;
use std::sync::atomic::Ordering;

fn first_window() -> Window {
    Window::new(at("2024-03-01 15:20:00"), at("2024-03-01 15:25:00"))
}

#[test]
fn test_transient_failure_is_retried_as_whole_batch() {
    let sink = FlakySink::new(2);
    let attempts = sink.attempts.clone();
    let rows = sink.rows.clone();
    let mut engine = AggregationEngine::new(ride_config(), Box::new(sink)).unwrap();
    let health = engine.health_checker();

    engine
        .run_cycle(vec![
            ride("2024-03-01 15:21:00", 1, 10.0, 2.0),
            ride("2024-03-01 15:22:00", 2, 20.0, 3.0),
        ])
        .unwrap();
    let report = engine
        .run_cycle(vec![ride("2024-03-01 15:26:00", 3, 5.0, 1.0)])
        .unwrap();

    assert_eq!(report.emit_attempts, 3);
    assert_eq!(report.rows_emitted, 2);
    assert_eq!(report.windows_purged, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // only the successful attempt delivered, and it delivered everything
    assert_eq!(rows.lock().unwrap().len(), 2);

    let metrics = engine.metrics().snapshot();
    assert_eq!(metrics.sink_failures, 2);
    assert_eq!(engine.metrics().pending_retries(), 0);
    assert_eq!(health.check().status, HealthStatus::Healthy);
    assert_eq!(engine.state(), TriggerState::Idle);
}

#[test]
fn test_exhausted_retries_stop_engine_and_keep_state() {
    let sink = FlakySink::always_failing();
    let attempts = sink.attempts.clone();
    let mut engine = AggregationEngine::new(ride_config(), Box::new(sink)).unwrap();
    let health = engine.health_checker();
    let mut supervised = HealthAggregator::new();
    supervised.add_checker(Box::new(engine.health_checker()));

    engine
        .run_cycle(vec![ride("2024-03-01 15:21:00", 1, 10.0, 2.0).with_offset(1)])
        .unwrap();
    assert_eq!(supervised.overall_health(), HealthStatus::Healthy);
    let result = engine.run_cycle(vec![ride("2024-03-01 15:26:00", 2, 5.0, 1.0).with_offset(2)]);

    match result {
        Err(EngineError::SinkWriteFailure { attempts: n, .. }) => assert_eq!(n, 3),
        other => panic!("expected SinkWriteFailure, got {:?}", other),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(engine.is_stopped());
    assert_eq!(health.check().status, HealthStatus::Unhealthy);
    assert_eq!(supervised.overall_health(), HealthStatus::Unhealthy);
    assert_eq!(supervised.all_checks()[0].component, "ride-stats");

    // the unemitted window was not purged
    assert!(engine
        .store()
        .contains(&first_window(), &GroupingKey::int(1)));
    assert!(matches!(
        engine.run_cycle(Vec::new()),
        Err(EngineError::Stopped { .. })
    ));

    // a resumed engine with a healthy sink delivers the pending window
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.last_offset, Some(2));
    let sink = LogSink::new();
    let delivered = sink.rows.clone();
    let mut resumed = AggregationEngine::restore(ride_config(), Box::new(sink), snapshot).unwrap();
    let report = resumed.run_cycle(Vec::new()).unwrap();
    assert_eq!(report.finalized_windows, vec![first_window()]);

    let delivered = delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_close(delivered[0].value("total_fare"), 10.0);
}

#[test]
fn test_single_attempt_configuration_fails_fast() {
    let sink = FlakySink::new(1);
    let attempts = sink.attempts.clone();
    let config = ride_config_with(&["sink.retry.max-attempts=1"]);
    let mut engine = AggregationEngine::new(config, Box::new(sink)).unwrap();

    engine
        .run_cycle(vec![ride("2024-03-01 15:21:00", 1, 10.0, 2.0)])
        .unwrap();
    assert!(matches!(
        engine.run_cycle(vec![ride("2024-03-01 15:30:00", 1, 1.0, 1.0)]),
        Err(EngineError::SinkWriteFailure { attempts: 1, .. })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.metrics().sink_failures(), 1);
}
