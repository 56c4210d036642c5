// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod buffer;
pub mod mapper;
pub mod source;

pub use buffer::{RecordBuffer, RecordSender};
pub use mapper::JsonRecordMapper;
