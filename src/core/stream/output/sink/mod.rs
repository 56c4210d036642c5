// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod log_sink;
pub mod sink_trait;

pub use log_sink::LogSink;
pub use sink_trait::Sink;
