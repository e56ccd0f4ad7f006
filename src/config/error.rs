//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },

    #[error("Missing required field {field} in {context}")]
    MissingRequiredField { field: String, context: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn file_read_error(path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.into(),
            message: error.to_string(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        match error {
            config::ConfigError::NotFound(key) => {
                Self::missing_required_field(key, "configuration source")
            }
            other => Self::parse(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for crate::error::PipelineError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}
