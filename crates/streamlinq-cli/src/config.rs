//! Configuration for the streamlinq CLI
//!
//! Loads configuration from:
//! 1. config.yaml - translation settings and logging
//! 2. .env file - loaded into the environment before anything else
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use streamlinq_ir::DecimalSettings;
use streamlinq_ksql::{FormatOptions, TranslationSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Settings handed to the type translator and statement generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub decimal_precision: u8,
    pub decimal_scale: u8,

    /// VALUE_FORMAT for created objects: AVRO, JSON, PROTOBUF, ...
    pub value_format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_format: Option<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        let decimal = DecimalSettings::default();
        Self {
            decimal_precision: decimal.precision,
            decimal_scale: decimal.scale,
            value_format: "AVRO".to_string(),
            key_format: None,
        }
    }
}

impl TranslationConfig {
    pub fn settings(&self) -> TranslationSettings {
        TranslationSettings {
            decimal: DecimalSettings {
                precision: self.decimal_precision,
                scale: self.decimal_scale,
            },
            formats: FormatOptions {
                value_format: self.value_format.clone(),
                key_format: self.key_format.clone(),
            },
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub translation: TranslationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.with_env_overrides()
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(precision) = parse_env("STREAMLINQ_DECIMAL_PRECISION")? {
            self.translation.decimal_precision = precision;
        }
        if let Some(scale) = parse_env("STREAMLINQ_DECIMAL_SCALE")? {
            self.translation.decimal_scale = scale;
        }
        if let Ok(format) = std::env::var("STREAMLINQ_VALUE_FORMAT") {
            self.translation.value_format = format;
        }
        if let Ok(format) = std::env::var("STREAMLINQ_KEY_FORMAT") {
            self.translation.key_format = Some(format);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.translation;
        if t.decimal_precision == 0 || t.decimal_scale > t.decimal_precision {
            return Err(ConfigError::InvalidValue {
                name: "translation.decimal_precision/decimal_scale".to_string(),
                value: format!("({},{})", t.decimal_precision, t.decimal_scale),
            });
        }
        Ok(())
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

fn parse_env(name: &str) -> Result<Option<u8>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
