// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod aggregator;
pub mod output;
pub mod window;
