//! Error types for kgpipe.
//!
//! Library crates use [`KgPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all kgpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum KgPipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search or page fetching.
    #[error("network error: {0}")]
    Network(String),

    /// JSON or HTML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad run name, bad selection, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An operation that needs a run was called before `create_new_run`.
    #[error("no active run: call create_new_run() first")]
    NoActiveRun,

    /// The shared run index stayed locked by another process.
    #[error("run index at {path:?} is locked by another process")]
    IndexLocked { path: PathBuf },

    /// Reserved extension point that has no implementation yet.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KgPipeError>;

impl KgPipeError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KgPipeError::config("MAX_NODES must be an integer");
        assert_eq!(err.to_string(), "config error: MAX_NODES must be an integer");

        let err = KgPipeError::validation("run name contains '/'");
        assert!(err.to_string().contains("run name"));
    }

    #[test]
    fn no_active_run_is_identifiable() {
        let err = KgPipeError::NoActiveRun;
        assert!(matches!(err, KgPipeError::NoActiveRun));
        assert!(err.to_string().contains("no active run"));
    }
}
