// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod cell;
pub mod store;

pub use cell::{AggregateCell, AggregateValues};
pub use store::{AggregationStateStore, StoredCell};
