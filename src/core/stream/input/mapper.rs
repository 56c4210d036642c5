// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON record mapping
//!
//! Maps one JSON object per record onto a [`Record`]:
//!
//! ```json
//! {"event_time": "2025-01-15 15:23:45", "driver_id": 42, "fare": 62.37, "distance": 12.45}
//! ```
//!
//! - `event_time` is either epoch milliseconds or a timestamp string
//!   (RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` read as UTC)
//! - grouping key fields must be integers or strings
//! - measure fields must be numbers; a missing or `null` measure is skipped
//!   by every aggregate

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{GroupingKey, KeyValue, Record};
use serde_json::Value as JsonValue;

pub const DEFAULT_TIME_FIELD: &str = "event_time";

#[derive(Debug, Clone)]
pub struct JsonRecordMapper {
    time_field: String,
    key_fields: Vec<String>,
    measure_fields: Vec<String>,
}

impl JsonRecordMapper {
    pub fn new(key_fields: Vec<String>, measure_fields: Vec<String>) -> Self {
        Self {
            time_field: DEFAULT_TIME_FIELD.to_string(),
            key_fields,
            measure_fields,
        }
    }

    pub fn with_time_field(mut self, time_field: impl Into<String>) -> Self {
        self.time_field = time_field.into();
        self
    }

    /// Parse one JSON document
    pub fn map(&self, input: &str) -> EngineResult<Record> {
        let json: JsonValue = serde_json::from_str(input)
            .map_err(|e| EngineError::serialization(format!("JSON parse error: {}", e)))?;
        self.map_value(&json)
    }

    pub fn map_value(&self, json: &JsonValue) -> EngineResult<Record> {
        let object = json
            .as_object()
            .ok_or_else(|| EngineError::serialization("expected a JSON object per record"))?;

        let event_time = object
            .get(&self.time_field)
            .ok_or_else(|| {
                EngineError::serialization(format!("missing '{}' field", self.time_field))
            })
            .and_then(|value| parse_event_time(value, &self.time_field))?;

        let mut key = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = match object.get(field) {
                Some(JsonValue::String(s)) => KeyValue::Str(s.clone()),
                Some(JsonValue::Number(n)) => n.as_i64().map(KeyValue::Int).ok_or_else(|| {
                    EngineError::serialization(format!(
                        "key field '{}' must be an integer or a string, got {}",
                        field, n
                    ))
                })?,
                Some(other) => {
                    return Err(EngineError::serialization(format!(
                        "key field '{}' must be an integer or a string, got {}",
                        field, other
                    )))
                }
                None => {
                    return Err(EngineError::serialization(format!(
                        "missing key field '{}'",
                        field
                    )))
                }
            };
            key.push(value);
        }

        let mut measures = Vec::with_capacity(self.measure_fields.len());
        for field in &self.measure_fields {
            let value = match object.get(field) {
                Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                Some(JsonValue::Null) | None => f64::NAN,
                Some(other) => {
                    return Err(EngineError::serialization(format!(
                        "measure field '{}' must be numeric, got {}",
                        field, other
                    )))
                }
            };
            measures.push(value);
        }

        Ok(Record::new(event_time, GroupingKey::new(key), measures))
    }
}

fn parse_event_time(value: &JsonValue, field: &str) -> EngineResult<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().ok_or_else(|| {
            EngineError::serialization(format!("'{}' must be integer milliseconds, got {}", field, n))
        }),
        JsonValue::String(s) => parse_timestamp(s).ok_or_else(|| {
            EngineError::serialization(format!("'{}' has an unrecognised timestamp '{}'", field, s))
        }),
        other => Err(EngineError::serialization(format!(
            "'{}' must be a number or a timestamp string, got {}",
            field, other
        ))),
    }
}

/// Parse an RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) timestamp to epoch milliseconds
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
}
