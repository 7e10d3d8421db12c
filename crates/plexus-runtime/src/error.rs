//! Error types for the runtime.
//!
//! Execution failures never escape the observer loop; they are recorded in
//! the [`ErrorLog`](crate::error_log::ErrorLog). Only operations driven from
//! outside the loop (startup, config loading, user writes) return
//! [`EngineError`].

use plexus_core::IdError;
use thiserror::Error;

/// Which side of the wire an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    FrontEnd,
    BackEnd,
}

/// Why a callback execution produced no data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("clientside function {namespace}.{function_name} is not registered")]
    UnknownClientside {
        namespace: String,
        function_name: String,
    },

    #[error("clientside function failed: {0}")]
    Clientside(String),

    #[error("callback returned {got} outputs, expected {expected}")]
    OutputArity { expected: usize, got: usize },

    #[error("no remote backend is configured")]
    NoRemoteBackend,

    #[error("server responded with status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("backend unreachable: {0}")]
    Connection(String),

    #[error("execution was abandoned before producing a result")]
    Disconnected,
}

impl ExecutionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownClientside { .. } | Self::Clientside(_) | Self::OutputArity { .. } => {
                ErrorKind::FrontEnd
            }
            Self::NoRemoteBackend
            | Self::Server { .. }
            | Self::InvalidResponse(_)
            | Self::Connection(_)
            | Self::Disconnected => ErrorKind::BackEnd,
        }
    }

    /// The backend could not be reached at all.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Failure of an [`HttpTransport`](crate::transport::HttpTransport) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Loading or validating an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Errors from operations driven from outside the observer loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not hydrated yet; dependencies and layout have not both loaded")]
    NotHydrated,

    #[error("component {0} is not in the layout")]
    UnknownComponent(String),

    #[error("invalid component id: {0}")]
    Id(#[from] IdError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("startup request to {url} returned status {status}")]
    Startup { url: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
