//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field needed for the requested operation is not set anywhere.
    #[error("missing required field '{field}' (set it in {hint})")]
    MissingField { field: String, hint: String },

    /// A field is set but unusable.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn missing(field: &str, env_var: Option<&str>) -> Self {
        let hint = match env_var {
            Some(var) => format!("the config file or ${}", var),
            None => "the config file".to_string(),
        };
        ConfigError::MissingField {
            field: field.to_string(),
            hint,
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
