// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod key;
pub mod record;

pub use key::{GroupingKey, KeyValue};
pub use record::Record;
