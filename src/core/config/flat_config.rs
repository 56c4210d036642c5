// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Layered Flat Configuration
//!
//! Engine settings are collected as dotted key/value pairs (`window.length`,
//! `output.mode`, ...) from several layers and merged by priority before being
//! converted into a typed [`EngineConfig`](super::EngineConfig).
//!
//! ## Configuration Sources (Priority: Low to High)
//!
//! 1. **RustDefault** - Built-in defaults
//! 2. **TomlFile** - Values from a TOML configuration file
//! 3. **CommandLine** - `--set key=value` overrides

use std::collections::HashMap;

/// Property source identifier with priority ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySource {
    /// Rust code defaults (priority: 0)
    RustDefault,
    /// TOML configuration file (priority: 1)
    TomlFile,
    /// Command line override (priority: 2)
    CommandLine,
}

impl PropertySource {
    /// Numeric priority for comparison (higher = more important)
    #[inline]
    pub const fn priority(&self) -> u8 {
        match self {
            PropertySource::RustDefault => 0,
            PropertySource::TomlFile => 1,
            PropertySource::CommandLine => 2,
        }
    }

    #[inline]
    pub const fn description(&self) -> &'static str {
        match self {
            PropertySource::RustDefault => "Rust default",
            PropertySource::TomlFile => "TOML file",
            PropertySource::CommandLine => "command line",
        }
    }
}

/// Flat key-value configuration with source tracking
///
/// A value is replaced only by a value from an equal or higher priority
/// source, so the last write within a layer wins.
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    properties: HashMap<String, String>,
    sources: HashMap<String, PropertySource>,
}

impl FlatConfig {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: PropertySource) {
        let key = key.into();

        if let Some(existing_source) = self.sources.get(&key) {
            if existing_source.priority() > source.priority() {
                return;
            }
        }

        self.properties.insert(key.clone(), value.into());
        self.sources.insert(key, source);
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.properties.get(key)
    }

    #[inline]
    pub fn get_with_source(&self, key: &str) -> Option<(&String, PropertySource)> {
        self.properties
            .get(key)
            .and_then(|value| self.sources.get(key).map(|source| (value, *source)))
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.properties.keys()
    }

    /// Merge another configuration into this one (respects priorities)
    pub fn merge(&mut self, other: &FlatConfig) {
        for (key, value) in &other.properties {
            if let Some(source) = other.sources.get(key) {
                self.set(key.clone(), value.clone(), *source);
            }
        }
    }

    /// Parse a `key=value` override as given on the command line
    pub fn set_override(&mut self, assignment: &str) -> Result<(), String> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("Invalid override '{}': expected key=value", assignment))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid override '{}': empty key", assignment));
        }
        self.set(key, value.trim(), PropertySource::CommandLine);
        Ok(())
    }

    /// Split a comma separated property into trimmed, non-empty items
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Flatten a TOML value into dotted keys
///
/// `{window: {length: "5m"}}` becomes `{"window.length": "5m"}`. Arrays of
/// scalars are joined with commas.
pub fn flatten_toml_value(
    value: &toml::Value,
    prefix: &str,
    result: &mut HashMap<String, String>,
) -> Result<(), String> {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml_value(val, &new_prefix, result)?;
            }
        }
        toml::Value::String(s) => {
            result.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Integer(i) => {
            result.insert(prefix.to_string(), i.to_string());
        }
        toml::Value::Float(f) => {
            result.insert(prefix.to_string(), f.to_string());
        }
        toml::Value::Boolean(b) => {
            result.insert(prefix.to_string(), b.to_string());
        }
        toml::Value::Datetime(dt) => {
            result.insert(prefix.to_string(), dt.to_string());
        }
        toml::Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    toml::Value::String(s) => values.push(s.clone()),
                    toml::Value::Integer(i) => values.push(i.to_string()),
                    toml::Value::Float(f) => values.push(f.to_string()),
                    toml::Value::Boolean(b) => values.push(b.to_string()),
                    other => {
                        return Err(format!(
                            "Nested values are not supported in array '{}': {}",
                            prefix, other
                        ))
                    }
                }
            }
            result.insert(prefix.to_string(), values.join(","));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_source_priority_ordering() {
        assert!(PropertySource::CommandLine.priority() > PropertySource::TomlFile.priority());
        assert!(PropertySource::TomlFile.priority() > PropertySource::RustDefault.priority());
    }

    #[test]
    fn test_flat_config_priority_override() {
        let mut config = FlatConfig::new();
        config.set("window.length", "1m", PropertySource::RustDefault);
        config.set("window.length", "5m", PropertySource::TomlFile);
        assert_eq!(config.get("window.length"), Some(&"5m".to_string()));

        config.set("window.length", "1m", PropertySource::RustDefault);
        assert_eq!(
            config.get_with_source("window.length"),
            Some((&"5m".to_string(), PropertySource::TomlFile))
        );
    }

    #[test]
    fn test_flat_config_merge() {
        let mut base = FlatConfig::new();
        base.set("output.mode", "append", PropertySource::RustDefault);
        base.set("trigger.interval", "1s", PropertySource::RustDefault);

        let mut file = FlatConfig::new();
        file.set("output.mode", "update", PropertySource::TomlFile);

        base.merge(&file);
        assert_eq!(base.get("output.mode"), Some(&"update".to_string()));
        assert_eq!(base.get("trigger.interval"), Some(&"1s".to_string()));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_set_override() {
        let mut config = FlatConfig::new();
        config.set("output.mode", "append", PropertySource::TomlFile);
        config.set_override("output.mode = complete").unwrap();
        assert_eq!(config.get("output.mode"), Some(&"complete".to_string()));
        assert!(config.set_override("no-equals-sign").is_err());
        assert!(config.set_override("=value").is_err());
    }

    #[test]
    fn test_get_list() {
        let mut config = FlatConfig::new();
        config.set("query.grouping-keys", " driver_id , zone ,", PropertySource::TomlFile);
        assert_eq!(config.get_list("query.grouping-keys"), vec!["driver_id", "zone"]);
        assert!(config.get_list("query.missing").is_empty());
    }

    #[test]
    fn test_flatten_toml_nested_tables() {
        let value: toml::Value = toml::from_str(
            r#"
            [window]
            mode = "sliding"
            length = "5m"
            allow-gaps = false

            [query]
            grouping-keys = ["driver_id"]
            measures = ["fare", "distance"]
            "#,
        )
        .unwrap();

        let mut result = HashMap::new();
        flatten_toml_value(&value, "", &mut result).unwrap();

        assert_eq!(result.get("window.mode"), Some(&"sliding".to_string()));
        assert_eq!(result.get("window.allow-gaps"), Some(&"false".to_string()));
        assert_eq!(result.get("query.grouping-keys"), Some(&"driver_id".to_string()));
        assert_eq!(result.get("query.measures"), Some(&"fare,distance".to_string()));
    }

    #[test]
    fn test_flatten_toml_rejects_nested_arrays() {
        let value: toml::Value = toml::from_str("values = [[1, 2]]").unwrap();
        let mut result = HashMap::new();
        assert!(flatten_toml_value(&value, "", &mut result).is_err());
    }
}
