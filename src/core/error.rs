// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine Error Types
//!
//! Error handling for the windowed aggregation engine and its adapters.
//!
//! Late records are not errors: they are dropped and counted in
//! [`EngineMetrics`](crate::core::util::metrics::EngineMetrics).

pub mod retry;

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid window, slide, lateness or query settings. Fatal at startup.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Invalid parameter '{parameter:?}': {message}")]
    InvalidParameter {
        message: String,
        parameter: Option<String>,
        expected: Option<String>,
    },

    /// A single sink write was rejected. Retried by the engine.
    #[error("Sink unavailable: {message}")]
    SinkUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Emission kept failing after every retry attempt. Fatal.
    #[error("Sink write failed after {attempts} attempt(s): {message}")]
    SinkWriteFailure { message: String, attempts: usize },

    /// Restored state failed its checksum or an invariant check. Fatal.
    #[error("State corruption: {message}")]
    StateCorruption { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Source error: {message}")]
    Source {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Engine stopped: {message}")]
    Stopped { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(message: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Create an invalid parameter error with details
    pub fn invalid_parameter_with_details(
        message: impl Into<String>,
        parameter: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            message: message.into(),
            parameter: Some(parameter.into()),
            expected: Some(expected.into()),
        }
    }

    /// Create a retryable sink error
    pub fn sink_unavailable(message: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a retryable sink error with source
    pub fn sink_unavailable_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::SinkUnavailable {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create the fatal sink error raised once retries are exhausted
    pub fn sink_write_failure(message: impl Into<String>, attempts: usize) -> Self {
        Self::SinkWriteFailure {
            message: message.into(),
            attempts,
        }
    }

    /// Create a state corruption error
    pub fn state_corruption(message: impl Into<String>) -> Self {
        Self::StateCorruption {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            source: None,
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        Self::Stopped {
            message: message.into(),
        }
    }

    /// Create a generic error from a string
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
