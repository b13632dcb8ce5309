use std::{borrow::Cow, io::Error as IoError, path::PathBuf};
use thiserror::Error as ThisError;

/// Errors raised while loading or validating a [`StreamsConfig`](crate::StreamsConfig).
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read configuration file '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: IoError,
    },

    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("topic name '{topic}' is used for more than one role")]
    DuplicateTopic { topic: String },
}

impl ConfigError {
    /// Identifying name of the error.
    pub fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Io { .. } => Cow::from("ConfigIoError"),
            Self::Yaml(_) => Cow::from("ConfigYamlError"),
            Self::Json(_) => Cow::from("ConfigJsonError"),
            Self::InvalidField { .. } => Cow::from("InvalidConfigField"),
            Self::DuplicateTopic { .. } => Cow::from("DuplicateTopic"),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
