// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod aggregation_engine;
pub mod config;
pub mod error;
pub mod event;
pub mod persistence;
pub mod query;
pub mod state;
pub mod stream;
pub mod time;
pub mod trigger;
pub mod util;

pub use aggregation_engine::{AggregationEngine, CycleReport};
pub use error::{EngineError, EngineResult};
