// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration: layered flat properties and the typed view built on them.

pub mod engine_config;
pub mod flat_config;

pub use engine_config::EngineConfig;
pub use flat_config::{flatten_toml_value, FlatConfig, PropertySource};
