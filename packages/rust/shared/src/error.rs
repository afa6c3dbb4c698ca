//! Error types for capwatch.
//!
//! Library crates use [`CapwatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all capwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum CapwatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or page fetch (timeouts, non-2xx,
    /// anti-bot interstitials included).
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// State or event store error. Fatal to a crawl run.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM classification error (transport, timeout, or malformed output).
    #[error("classification error: {0}")]
    Classification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad priority, unknown category, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A crawl run was requested while another one is in progress.
    #[error("a crawl run is already in progress")]
    AlreadyRunning,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CapwatchError>;

impl CapwatchError {
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

    /// Whether this error must abort a crawl run rather than being isolated
    /// to one source or chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Config { .. } | Self::Io { .. })
    }
}
