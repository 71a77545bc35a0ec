//! Configuration error types

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Numeric value outside its accepted range
    #[error("Invalid value for field '{field}': {value}. {hint}")]
    Range {
        field: String,
        value: String,
        hint: String,
    },

    /// Required field left empty
    #[error("Field '{0}' must not be empty")]
    Empty(String),

    /// Table name or prefix that is not a plain identifier
    #[error("Field '{field}' holds '{value}', which is not a valid identifier")]
    InvalidName { field: String, value: String },

    /// Missing version field in YAML
    #[error("Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    /// Unsupported version
    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u64, supported: Vec<u32> },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn range(field: impl Into<String>, value: impl ToString, hint: impl Into<String>) -> Self {
        Self::Range {
            field: field.into(),
            value: value.to_string(),
            hint: hint.into(),
        }
    }

    pub fn invalid_name(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidName {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field the error refers to, when it refers to one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Range { field, .. } | Self::InvalidName { field, .. } | Self::Empty(field) => {
                Some(field.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_message() {
        let err = ConfigError::range("distance", -1.0, "Use a non-negative distance in metres");
        assert_eq!(
            err.to_string(),
            "Invalid value for field 'distance': -1. Use a non-negative distance in metres"
        );
        assert_eq!(err.field(), Some("distance"));
    }

    #[test]
    fn test_unsupported_version_lists_supported() {
        let err = ConfigError::UnsupportedVersion {
            found: 3,
            supported: vec![1],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported configuration version 3. Supported versions: 1"
        );
        assert_eq!(err.field(), None);
    }
}
