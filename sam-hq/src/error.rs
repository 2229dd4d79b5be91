use std::fmt::Display;

use thiserror::Error;

/// The error type for `SAM-HQ` configuration operations.
///
/// Construction is single-shot: every failure is surfaced to the caller as one of
/// these variants and nothing is retried or patched up locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamHqError {
    /// A field holds a value the consuming model cannot work with.
    #[error("Invalid model configuration: `{field}` = {value}: {reason}")]
    InvalidConfiguration {
        /// The name of the offending field.
        field: String,
        /// The value that was received, rendered for display.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A configuration could not be converted to or from a flattened mapping or JSON.
    #[error("Configuration (de)serialization failed: {reason}")]
    Serialization {
        /// The serializer's error message.
        reason: String,
    },

    /// Saving or loading a configuration file failed.
    #[error("Failed to persist configuration: {reason}")]
    Persistence {
        /// The reason for the persistence failure.
        reason: String,
    },
}

impl SamHqError {
    pub(crate) fn invalid(
        field: impl Into<String>,
        value: impl Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Qualifies the offending field with the name of the sub-config holding it,
    /// e.g. `patch_size` becomes `vision_config.patch_size`.
    #[must_use]
    pub(crate) fn within(self, parent: &str) -> Self {
        match self {
            Self::InvalidConfiguration {
                field,
                value,
                reason,
            } => Self::InvalidConfiguration {
                field: format!("{parent}.{field}"),
                value,
                reason,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for SamHqError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<burn::config::ConfigError> for SamHqError {
    fn from(err: burn::config::ConfigError) -> Self {
        Self::Persistence {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SamHqError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            reason: err.to_string(),
        }
    }
}

/// A specialized `Result` type for `SAM-HQ` configuration operations.
pub type SamHqResult<T> = Result<T, SamHqError>;

/// Fails with [`SamHqError::InvalidConfiguration`] unless `condition` holds.
pub(crate) fn ensure(
    condition: bool,
    field: &str,
    value: impl Display,
    reason: &str,
) -> SamHqResult<()> {
    if condition {
        Ok(())
    } else {
        Err(SamHqError::invalid(field, value, reason))
    }
}

/// Checks that `value` is a finite, strictly positive float.
pub(crate) fn ensure_positive(field: &str, value: f64) -> SamHqResult<()> {
    ensure(
        value.is_finite() && value > 0.0,
        field,
        value,
        "must be a finite positive number",
    )
}
