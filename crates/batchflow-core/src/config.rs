//! Engine configuration
//!
//! Storage bounds and concurrency defaults shared by the repository backends,
//! the step handler and the split state.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::error::{CoreError, Result};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum persisted length of an exit description
    #[serde(default = "default_max_exit_description_length")]
    pub max_exit_description_length: usize,

    /// Maximum length in bytes of the inline (short) serialized execution context
    #[serde(default = "default_short_context_length")]
    pub short_context_length: usize,

    /// Start limit applied to steps that do not configure one
    #[serde(default = "default_start_limit")]
    pub default_start_limit: u32,

    /// Upper bound of concurrently running sub-flows in a split
    #[serde(default)]
    pub split_max_concurrency: Option<usize>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_exit_description_length() -> usize {
    2500
}

fn default_short_context_length() -> usize {
    2500
}

fn default_start_limit() -> u32 {
    u32::MAX
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_exit_description_length: default_max_exit_description_length(),
            short_context_length: default_short_context_length(),
            default_start_limit: default_start_limit(),
            split_max_concurrency: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the defaults overridden by environment variables
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse_env::<usize>("BATCHFLOW_MAX_EXIT_DESCRIPTION_LENGTH") {
            config.max_exit_description_length = value;
        }

        if let Some(value) = parse_env::<usize>("BATCHFLOW_SHORT_CONTEXT_LENGTH") {
            config.short_context_length = value;
        }

        if let Some(value) = parse_env::<u32>("BATCHFLOW_DEFAULT_START_LIMIT") {
            config.default_start_limit = value;
        }

        if let Some(value) = parse_env::<usize>("BATCHFLOW_SPLIT_MAX_CONCURRENCY") {
            config.split_max_concurrency = Some(value);
        }

        if let Ok(level) = env::var("BATCHFLOW_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_exit_description_length == 0 {
            return Err(CoreError::ConfigurationError(
                "max_exit_description_length must be greater than zero".to_string(),
            ));
        }
        if self.short_context_length == 0 {
            return Err(CoreError::ConfigurationError(
                "short_context_length must be greater than zero".to_string(),
            ));
        }
        if self.split_max_concurrency == Some(0) {
            return Err(CoreError::ConfigurationError(
                "split_max_concurrency must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} value: {}", name, raw);
            None
        }
    }
}
