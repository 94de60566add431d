use std::io;

/// Custom error type for opencast_codebuild operations
#[derive(Debug, thiserror::Error)]
pub enum CodebuildError {
    #[error("Required environment variable {0} is not set")]
    ConfigurationMissing(String),

    #[error("Parameter '{key}' was not found in the parameter store")]
    ParameterNotFound { key: String },

    #[error("Failed to fetch parameter '{key}': {message}")]
    Transport { key: String, message: String },

    #[error("Parameter '{key}' is not valid JSON: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stack configuration is incomplete: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Helper type for Results that use CodebuildError
pub type Result<T> = std::result::Result<T, CodebuildError>;
