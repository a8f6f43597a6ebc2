//! Error types for log context operations.
//!
//! Stack mutations are local, in-memory operations with no transient failure
//! modes. The only push-time failure is an invalid argument, which is detected
//! before the stack is touched, so a failed push never leaves a partial
//! mutation behind.

use thiserror::Error;

/// Errors raised at the call site of a push operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// An argument passed to a push operation is absent or malformed.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// The name of the offending argument.
        argument: String,
        /// Why the argument was rejected.
        reason: String,
    },
}

impl ContextError {
    /// Creates a new invalid argument error.
    #[must_use]
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this is an invalid argument error.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns the name of the rejected argument.
    #[must_use]
    pub fn argument(&self) -> &str {
        match self {
            Self::InvalidArgument { argument, .. } => argument,
        }
    }
}

/// Errors raised while loading or validating enrichment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML or does not match the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration parsed but violates a constraint.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result alias for push operations.
pub type ContextResult<T> = Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_error() {
        let err = ContextError::invalid_argument("name", "must not be empty");
        assert!(err.is_invalid_argument());
        assert_eq!(err.argument(), "name");
        assert!(err.to_string().contains("`name`"));
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = ContextError::invalid_argument("name", "empty");
        let err2 = ContextError::invalid_argument("name", "empty");
        let err3 = ContextError::invalid_argument("value", "empty");

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = ConfigError::Validation("duplicate source `global`".to_string());
        assert!(err.to_string().contains("duplicate source"));
    }
}
