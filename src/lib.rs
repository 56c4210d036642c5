// SPDX-License-Identifier: MIT OR Apache-2.0

//! # fareflux
//!
//! Continuous event-time windowed aggregation over ride events.
//!
//! The engine ingests timestamped records, assigns them to fixed or sliding
//! windows, folds their measures into per-(window, key) accumulators, tracks a
//! bounded-lateness watermark and releases aggregate rows to a sink under one
//! of three output modes (append, update, complete).
//!
//! ```rust,ignore
//! use fareflux::core::config::EngineConfig;
//! use fareflux::core::stream::output::sink::LogSink;
//! use fareflux::core::AggregationEngine;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     [window]
//!     mode = "fixed"
//!     length = "5m"
//!
//!     [query]
//!     grouping-keys = ["driver_id"]
//!     measures = ["fare", "distance"]
//!     aggregates = ["sum(fare) as total_fare", "avg(distance) as avg_distance"]
//! "#)?;
//! let mut engine = AggregationEngine::new(config, Box::new(LogSink::new()))?;
//! let report = engine.run_cycle(records)?;
//! ```

pub mod core;
