// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod assigner;
pub mod types;

pub use assigner::{WindowAssigner, WindowSpec};
pub use types::{Window, WindowMode};
