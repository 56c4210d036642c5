// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health checks for a running engine

use super::metrics::EngineMetrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: i64,
}

impl HealthCheck {
    pub fn new(component: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            status,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Health checker trait
pub trait HealthChecker: Send + Sync {
    fn check(&self) -> HealthCheck;
}

/// Composite health checker
#[derive(Default)]
pub struct HealthAggregator {
    checkers: Vec<Box<dyn HealthChecker>>,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker(&mut self, checker: Box<dyn HealthChecker>) {
        self.checkers.push(checker);
    }

    pub fn overall_health(&self) -> HealthStatus {
        let mut has_degraded = false;
        for checker in &self.checkers {
            match checker.check().status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }
        if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn all_checks(&self) -> Vec<HealthCheck> {
        self.checkers.iter().map(|c| c.check()).collect()
    }
}

/// Reports the engine's emission health.
///
/// Degraded while a sink emission is being retried, unhealthy once the
/// engine stopped on a fatal error.
pub struct EngineHealthChecker {
    name: String,
    metrics: Arc<EngineMetrics>,
    failed: Arc<AtomicBool>,
}

impl EngineHealthChecker {
    pub fn new(name: impl Into<String>, metrics: Arc<EngineMetrics>, failed: Arc<AtomicBool>) -> Self {
        Self {
            name: name.into(),
            metrics,
            failed,
        }
    }
}

impl HealthChecker for EngineHealthChecker {
    fn check(&self) -> HealthCheck {
        if self.failed.load(Ordering::Relaxed) {
            return HealthCheck::new(&self.name, HealthStatus::Unhealthy, "engine stopped on a fatal error");
        }
        let pending = self.metrics.pending_retries();
        if pending > 0 {
            return HealthCheck::new(
                &self.name,
                HealthStatus::Degraded,
                format!("sink emission retrying ({} failed attempt(s))", pending),
            );
        }
        HealthCheck::new(&self.name, HealthStatus::Healthy, "emitting")
    }
}
