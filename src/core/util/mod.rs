// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod health;
pub mod metrics;
pub mod serialization;
pub mod shutdown;

pub use health::{EngineHealthChecker, HealthAggregator, HealthCheck, HealthChecker, HealthStatus};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use serialization::{from_bytes, to_bytes};
pub use shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason};
