// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Engine Configuration
//!
//! Typed, validated engine settings built from a layered [`FlatConfig`].
//!
//! ```toml
//! [engine]
//! name = "ride-stats"
//!
//! [window]
//! mode = "sliding"        # fixed | sliding
//! length = "5m"
//! slide = "1m"
//! allow-gaps = false
//!
//! [watermark]
//! allowed-lateness = "30s"
//!
//! [output]
//! mode = "append"         # append | update | complete
//!
//! [trigger]
//! mode = "interval"       # interval | on-arrival
//! interval = "1s"
//!
//! [query]
//! grouping-keys = ["driver_id"]
//! measures = ["fare", "distance"]
//! aggregates = ["sum(fare) as total_fare", "avg(distance) as avg_distance"]
//!
//! [sink.retry]
//! max-attempts = 5
//! backoff = "exponential"
//! initial-delay = "100ms"
//! max-delay = "10s"
//! ```

use super::flat_config::{flatten_toml_value, FlatConfig, PropertySource};
use crate::core::error::retry::{parse_duration_for_key, RetryConfig};
use crate::core::error::{EngineError, EngineResult};
use crate::core::query::aggregator::function::AGGREGATES_KEY;
use crate::core::query::aggregator::AggregateSpec;
use crate::core::query::output::emission::OUTPUT_MODE_KEY;
use crate::core::query::output::OutputMode;
use crate::core::query::window::assigner::{WINDOW_LENGTH_KEY, WINDOW_SLIDE_KEY};
use crate::core::query::window::{WindowMode, WindowSpec};
use crate::core::trigger::policy::{TRIGGER_INTERVAL_KEY, TRIGGER_MODE_KEY};
use crate::core::trigger::{TriggerMode, TriggerPolicy};
use std::collections::HashMap;

pub const ENGINE_NAME_KEY: &str = "engine.name";
pub const WINDOW_MODE_KEY: &str = "window.mode";
pub const WINDOW_ALLOW_GAPS_KEY: &str = "window.allow-gaps";
pub const ALLOWED_LATENESS_KEY: &str = "watermark.allowed-lateness";
pub const GROUPING_KEYS_KEY: &str = "query.grouping-keys";
pub const MEASURES_KEY: &str = "query.measures";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub name: String,
    pub window: WindowSpec,
    /// Permit `slide > length`, leaving event times covered by no window
    pub allow_gaps: bool,
    pub allowed_lateness_ms: i64,
    pub output_mode: OutputMode,
    pub trigger: TriggerPolicy,
    /// Zero keys means one global aggregate per window
    pub grouping_keys: Vec<String>,
    pub measures: Vec<String>,
    pub aggregates: Vec<AggregateSpec>,
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Built-in defaults, the lowest configuration layer
    pub fn defaults() -> FlatConfig {
        let mut config = FlatConfig::new();
        let defaults = [
            (ENGINE_NAME_KEY, "fareflux"),
            (WINDOW_MODE_KEY, "fixed"),
            (WINDOW_LENGTH_KEY, "5m"),
            (WINDOW_ALLOW_GAPS_KEY, "false"),
            (ALLOWED_LATENESS_KEY, "0ms"),
            (OUTPUT_MODE_KEY, "append"),
            (TRIGGER_MODE_KEY, "interval"),
            (TRIGGER_INTERVAL_KEY, "1s"),
            (GROUPING_KEYS_KEY, ""),
            (MEASURES_KEY, "fare,distance"),
            (
                AGGREGATES_KEY,
                "sum(fare) as total_fare,avg(distance) as avg_distance",
            ),
        ];
        for (key, value) in defaults {
            config.set(key, value, PropertySource::RustDefault);
        }
        config
    }

    /// Build from explicit properties layered over [`EngineConfig::defaults`]
    pub fn from_flat_config(config: &FlatConfig) -> EngineResult<Self> {
        let mut merged = Self::defaults();
        merged.merge(config);

        let name = merged
            .get(ENGINE_NAME_KEY)
            .cloned()
            .unwrap_or_else(|| "fareflux".to_string());

        let mode_value = required(&merged, WINDOW_MODE_KEY)?;
        let mode = WindowMode::parse(mode_value).ok_or_else(|| {
            EngineError::invalid_parameter_with_details(
                format!("Invalid window mode '{}'", mode_value),
                WINDOW_MODE_KEY,
                "'fixed' or 'sliding'",
            )
        })?;
        let length = parse_duration_for_key(required(&merged, WINDOW_LENGTH_KEY)?, WINDOW_LENGTH_KEY)?;
        let window = match mode {
            WindowMode::Fixed => {
                if let Some(slide) = merged.get(WINDOW_SLIDE_KEY) {
                    let slide = parse_duration_for_key(slide, WINDOW_SLIDE_KEY)?;
                    if slide != length {
                        return Err(EngineError::configuration_with_key(
                            "fixed windows cannot declare a slide different from their length",
                            WINDOW_SLIDE_KEY,
                        ));
                    }
                }
                WindowSpec::fixed(length)
            }
            WindowMode::Sliding => {
                let slide = merged.get(WINDOW_SLIDE_KEY).ok_or_else(|| {
                    EngineError::configuration_with_key(
                        "sliding windows require a slide interval",
                        WINDOW_SLIDE_KEY,
                    )
                })?;
                WindowSpec::sliding(length, parse_duration_for_key(slide, WINDOW_SLIDE_KEY)?)
            }
        };

        let allow_gaps = parse_bool(required(&merged, WINDOW_ALLOW_GAPS_KEY)?, WINDOW_ALLOW_GAPS_KEY)?;
        window.validate(!allow_gaps)?;

        let lateness = parse_duration_for_key(
            required(&merged, ALLOWED_LATENESS_KEY)?,
            ALLOWED_LATENESS_KEY,
        )?;
        let allowed_lateness_ms = i64::try_from(lateness.as_millis()).map_err(|_| {
            EngineError::configuration_with_key("allowed lateness is too large", ALLOWED_LATENESS_KEY)
        })?;

        let output_mode = OutputMode::parse(required(&merged, OUTPUT_MODE_KEY)?)?;

        let trigger = TriggerPolicy::new(
            TriggerMode::parse(required(&merged, TRIGGER_MODE_KEY)?)?,
            parse_duration_for_key(required(&merged, TRIGGER_INTERVAL_KEY)?, TRIGGER_INTERVAL_KEY)?,
        )?;

        let grouping_keys = merged.get_list(GROUPING_KEYS_KEY);
        check_unique(&grouping_keys, GROUPING_KEYS_KEY)?;

        let measures = merged.get_list(MEASURES_KEY);
        check_unique(&measures, MEASURES_KEY)?;
        if let Some(clash) = measures.iter().find(|m| grouping_keys.contains(m)) {
            return Err(EngineError::configuration_with_key(
                format!("'{}' is declared both as grouping key and measure", clash),
                MEASURES_KEY,
            ));
        }

        let aggregates = merged
            .get_list(AGGREGATES_KEY)
            .iter()
            .map(|expr| AggregateSpec::parse(expr, &measures))
            .collect::<EngineResult<Vec<_>>>()?;
        if aggregates.is_empty() {
            return Err(EngineError::configuration_with_key(
                "at least one aggregate is required",
                AGGREGATES_KEY,
            ));
        }
        let aliases: Vec<String> = aggregates.iter().map(|a| a.alias.clone()).collect();
        check_unique(&aliases, AGGREGATES_KEY)?;

        let retry = RetryConfig::from_flat_config(&merged)?;

        Ok(Self {
            name,
            window,
            allow_gaps,
            allowed_lateness_ms,
            output_mode,
            trigger,
            grouping_keys,
            measures,
            aggregates,
            retry,
        })
    }

    /// Build from a TOML document layered over the defaults
    pub fn from_toml_str(toml_text: &str) -> EngineResult<Self> {
        Self::from_flat_config(&Self::flat_from_toml(toml_text)?)
    }

    /// Build from an optional TOML document plus `key=value` overrides
    pub fn load(toml_text: Option<&str>, overrides: &[String]) -> EngineResult<Self> {
        let mut config = match toml_text {
            Some(text) => Self::flat_from_toml(text)?,
            None => FlatConfig::new(),
        };
        for assignment in overrides {
            config
                .set_override(assignment)
                .map_err(EngineError::configuration)?;
        }
        Self::from_flat_config(&config)
    }

    fn flat_from_toml(toml_text: &str) -> EngineResult<FlatConfig> {
        let value: toml::Value = toml::from_str(toml_text)
            .map_err(|e| EngineError::configuration(format!("Invalid TOML configuration: {}", e)))?;

        let mut flat = HashMap::new();
        flatten_toml_value(&value, "", &mut flat).map_err(EngineError::configuration)?;

        let mut config = FlatConfig::new();
        for (key, value) in flat {
            config.set(key, value, PropertySource::TomlFile);
        }
        Ok(config)
    }

    pub fn is_keyed(&self) -> bool {
        !self.grouping_keys.is_empty()
    }
}

fn required<'a>(config: &'a FlatConfig, key: &str) -> EngineResult<&'a String> {
    config
        .get(key)
        .ok_or_else(|| EngineError::configuration_with_key(format!("missing '{}'", key), key))
}

fn parse_bool(value: &str, key: &str) -> EngineResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(EngineError::invalid_parameter_with_details(
            format!("Invalid boolean '{}'", value),
            key,
            "true or false",
        )),
    }
}

fn check_unique(names: &[String], key: &str) -> EngineResult<()> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(EngineError::configuration_with_key(
                format!("'{}' is declared more than once", name),
                key,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::retry::BackoffStrategy;
    use crate::core::query::aggregator::AggregateFunction;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_flat_config(&FlatConfig::new()).unwrap();
        assert_eq!(config.name, "fareflux");
        assert_eq!(config.window, WindowSpec::fixed(Duration::from_secs(300)));
        assert_eq!(config.allowed_lateness_ms, 0);
        assert_eq!(config.output_mode, OutputMode::Append);
        assert_eq!(config.trigger, TriggerPolicy::default());
        assert!(!config.is_keyed());
        assert_eq!(config.aggregates.len(), 2);
        assert_eq!(config.aggregates[1].function, AggregateFunction::Avg);
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [engine]
            name = "ride-stats"

            [window]
            mode = "sliding"
            length = "5m"
            slide = "1m"

            [watermark]
            allowed-lateness = "30s"

            [output]
            mode = "update"

            [trigger]
            mode = "on-arrival"
            interval = "250ms"

            [query]
            grouping-keys = ["driver_id"]
            measures = ["fare", "distance"]
            aggregates = ["sum(fare) as total_fare", "max(distance)", "count(*) as rides"]

            [sink.retry]
            max-attempts = 5
            backoff = "fixed"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "ride-stats");
        assert_eq!(
            config.window,
            WindowSpec::sliding(Duration::from_secs(300), Duration::from_secs(60))
        );
        assert_eq!(config.allowed_lateness_ms, 30_000);
        assert_eq!(config.output_mode, OutputMode::Update);
        assert_eq!(config.trigger.mode, TriggerMode::OnArrival);
        assert_eq!(config.trigger.interval, Duration::from_millis(250));
        assert_eq!(config.grouping_keys, vec!["driver_id"]);
        assert_eq!(config.aggregates[1].alias, "max_distance");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, BackoffStrategy::Fixed);
    }

    #[test]
    fn test_overrides_win_over_toml() {
        let config = EngineConfig::load(
            Some("[output]\nmode = \"update\"\n"),
            &["output.mode=complete".to_string()],
        )
        .unwrap();
        assert_eq!(config.output_mode, OutputMode::Complete);
    }

    #[test]
    fn test_sliding_requires_slide() {
        let result = EngineConfig::from_toml_str("[window]\nmode = \"sliding\"\nlength = \"5m\"\n");
        assert!(matches!(
            result,
            Err(EngineError::Configuration { config_key: Some(ref k), .. }) if k == WINDOW_SLIDE_KEY
        ));
    }

    #[test]
    fn test_slide_longer_than_length_needs_allow_gaps() {
        let toml_text = "[window]\nmode = \"sliding\"\nlength = \"1m\"\nslide = \"2m\"\n";
        assert!(EngineConfig::from_toml_str(toml_text).is_err());

        let with_gaps = format!("{}allow-gaps = true\n", toml_text);
        let config = EngineConfig::from_toml_str(&with_gaps).unwrap();
        assert!(config.allow_gaps);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(EngineConfig::from_toml_str("[window]\nlength = \"0s\"\n").is_err());
        assert!(EngineConfig::from_toml_str("[window]\nlength = \"soon\"\n").is_err());
        assert!(EngineConfig::from_toml_str("[window]\nmode = \"session\"\n").is_err());
        assert!(EngineConfig::from_toml_str("[trigger]\ninterval = \"0ms\"\n").is_err());
        assert!(EngineConfig::from_toml_str("[query]\naggregates = []\n").is_err());
        assert!(EngineConfig::from_toml_str(
            "[query]\naggregates = [\"sum(fare) as x\", \"avg(distance) as x\"]\n"
        )
        .is_err());
        assert!(EngineConfig::from_toml_str(
            "[query]\ngrouping-keys = [\"fare\"]\nmeasures = [\"fare\"]\naggregates = [\"sum(fare)\"]\n"
        )
        .is_err());
        assert!(EngineConfig::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn test_fixed_window_with_matching_slide_is_accepted() {
        let config =
            EngineConfig::from_toml_str("[window]\nlength = \"5m\"\nslide = \"300s\"\n").unwrap();
        assert_eq!(config.window.slide_ms, 300_000);
        assert!(EngineConfig::from_toml_str("[window]\nlength = \"5m\"\nslide = \"1m\"\n").is_err());
    }
}
