use std::path::PathBuf;

use thiserror::Error;
use triage_core::TriageError;

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] TriageError),

    #[error("invalid script: {message}")]
    InvalidScript { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl ReplayError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            Self::InvalidScript { .. } | Self::Json(_) => 3,
            Self::Core(TriageError::ConfigParse(_) | TriageError::InvalidConfig { .. }) => 4,
            _ => 1,
        }
    }

    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::InvalidScript {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
