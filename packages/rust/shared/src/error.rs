//! Error types for docs2md.
//!
//! Library crates use [`Docs2MdError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only [`Docs2MdError::Discovery`], [`Docs2MdError::Render`] and
//! [`Docs2MdError::Cancelled`] abort a consolidation run. Per-document and
//! per-reference problems are recorded in the run manifest instead.

use std::path::PathBuf;

/// Top-level error type for all docs2md operations.
#[derive(Debug, thiserror::Error)]
pub enum Docs2MdError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during crawl.
    #[error("network error: {0}")]
    Network(String),

    /// Markup parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid input path, bad option combination, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// No document could be enumerated from the source.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The output sink could not be written.
    #[error("render failed: {0}")]
    Render(String),

    /// The run was cancelled before rendering.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Docs2MdError>;

impl Docs2MdError {
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

    /// Whether this error aborts a consolidation run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Discovery(_) | Self::Render(_) | Self::Cancelled
        )
    }
}
