use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DoctorError>;

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid component id: {0}")]
    Id(#[from] plexus_core::IdError),

    #[error(transparent)]
    Config(#[from] plexus_runtime::ConfigError),

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{message}")]
    Exit { code: i32, message: String },
}

impl DoctorError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            _ => 1,
        }
    }

    #[must_use]
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
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

#[cfg(test)]
mod tests {
    use super::DoctorError;

    #[test]
    fn exit_constructor_preserves_code_and_message() {
        let error = DoctorError::exit(2, "3 declarations rejected");
        assert_eq!(error.exit_code(), 2);
        assert_eq!(error.to_string(), "3 declarations rejected");
    }

    #[test]
    fn other_errors_exit_with_one() {
        let error = DoctorError::invalid("bad");
        assert_eq!(error.exit_code(), 1);
        assert_eq!(error.to_string(), "invalid argument: bad");
    }
}
