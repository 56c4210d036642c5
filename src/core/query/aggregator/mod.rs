// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod accumulator;
pub mod function;

pub use accumulator::Accumulator;
pub use function::{AggregateFunction, AggregateSpec};
