//! TOML configuration for the enriching layer.
//!
//! ```toml
//! sources = ["ambient", "global"]
//! include_event_fields = true
//! max_destructuring_depth = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layer::EnrichingLayerBuilder;
use crate::value::{DEFAULT_MAX_DESTRUCTURING_DEPTH, DefaultPropertyFactory};

/// A context stack the layer reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// The flow-local stack behind [`LogContext`](crate::LogContext).
    Ambient,
    /// The process-wide stack behind [`GlobalLogContext`](crate::GlobalLogContext).
    Global,
}

/// Configuration for an [`EnrichingLayer`](crate::EnrichingLayer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Sources applied to every record, in order.
    #[serde(default = "default_sources")]
    pub sources: Vec<ContextSource>,

    /// Copy each event's own fields into the record before enrichment.
    #[serde(default = "default_include_event_fields")]
    pub include_event_fields: bool,

    /// Nesting depth at which destructured values are cut off.
    #[serde(default = "default_max_destructuring_depth")]
    pub max_destructuring_depth: usize,
}

fn default_sources() -> Vec<ContextSource> {
    vec![ContextSource::Ambient, ContextSource::Global]
}

const fn default_include_event_fields() -> bool {
    true
}

const fn default_max_destructuring_depth() -> usize {
    DEFAULT_MAX_DESTRUCTURING_DEPTH
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            include_event_fields: default_include_event_fields(),
            max_destructuring_depth: default_max_destructuring_depth(),
        }
    }
}

impl EnrichmentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails
    /// [`from_toml`](Self::from_toml).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed, contains unknown keys, or
    /// fails [`validate`](Self::validate).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the configuration's constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if no source is configured, a
    /// source is listed twice, or the destructuring depth is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Validation(
                "at least one context source is required".to_string(),
            ));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].contains(source) {
                return Err(ConfigError::Validation(format!(
                    "context source {source:?} is listed more than once"
                )));
            }
        }
        if self.max_destructuring_depth == 0 {
            return Err(ConfigError::Validation(
                "max_destructuring_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a layer builder wired according to this configuration.
    #[must_use]
    pub fn layer_builder(&self) -> EnrichingLayerBuilder {
        let factory = DefaultPropertyFactory::new().with_max_depth(self.max_destructuring_depth);
        self.sources.iter().fold(
            EnrichingLayerBuilder::default()
                .with_factory(factory)
                .include_event_fields(self.include_event_fields),
            |builder, source| match source {
                ContextSource::Ambient => builder.from_log_context(),
                ContextSource::Global => builder.from_global_log_context(),
            },
        )
    }
}
