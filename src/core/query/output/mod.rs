// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod emission;
pub mod row;

pub use emission::{EmissionPlan, EmissionPolicy, OutputMode};
pub use row::{AggregateValue, OutputRow};
