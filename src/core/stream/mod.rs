// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion and emission adapters around the engine.

pub mod input;
pub mod output;

pub use self::input::source::{json_lines_source::JsonLinesSource, RecordSource};
pub use self::input::{JsonRecordMapper, RecordBuffer, RecordSender};
pub use self::output::{LogSink, Sink};
