//! Error types for the learning path service.
//!
//! Library crates use [`LearnPathError`] via `thiserror`.
//! The server app wraps this with `color-eyre` for CLI diagnostics and maps
//! [`ErrorKind`] onto HTTP status codes.

use std::path::PathBuf;

/// Top-level error type for all service operations.
#[derive(Debug, thiserror::Error)]
pub enum LearnPathError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a document.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or concept extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed request input (empty URL list, empty label, NaN mastery).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A start or goal concept that is not a node of the queried graph.
    #[error("Concept '{label}' is not in the graph.")]
    UnknownConcept { label: String },

    /// Weight vector with a negative or non-finite component, or a zero sum.
    #[error("Invalid weights: {reason}")]
    InvalidWeights { reason: String },

    /// The goal is unreachable from the start over directed edges.
    #[error("No path found.")]
    NoPath { start: String, goal: String },

    /// `find_path` was called before any graph was built.
    #[error("Graph not built yet.")]
    GraphNotBuilt,

    /// The requested graph session does not exist (or was evicted).
    #[error("Graph {0} not found.")]
    GraphNotFound(String),

    /// Unexpected failure (task panic, poisoned invariant).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LearnPathError>;

/// How a failure should be reported to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was malformed or referenced unknown entities.
    Validation,
    /// The request was well-formed but has no result.
    NoResult,
    /// Something went wrong on our side.
    Internal,
}

impl LearnPathError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-weights error.
    pub fn invalid_weights(reason: impl Into<String>) -> Self {
        Self::InvalidWeights {
            reason: reason.into(),
        }
    }

    /// Create an unknown-concept error.
    pub fn unknown_concept(label: impl Into<String>) -> Self {
        Self::UnknownConcept {
            label: label.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::UnknownConcept { .. }
            | Self::InvalidWeights { .. }
            | Self::GraphNotBuilt => ErrorKind::Validation,
            Self::NoPath { .. } | Self::GraphNotFound(_) => ErrorKind::NoResult,
            Self::Config { .. }
            | Self::Network(_)
            | Self::Parse { .. }
            | Self::Io { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message shown to API callers in the `detail` field.
    ///
    /// Internal failures are never echoed verbatim.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation { message } => message.clone(),
            _ if self.kind() == ErrorKind::Internal => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}
