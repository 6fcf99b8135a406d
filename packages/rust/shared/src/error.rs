//! Error types for papermill.
//!
//! Library crates use [`PapermillError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all papermill operations.
#[derive(Debug, thiserror::Error)]
pub enum PapermillError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the search API or the scraper.
    #[error("network error: {0}")]
    Network(String),

    /// Response parsing error (search API JSON, model output, ...).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Completion service error (transport, API status, or empty answer).
    #[error("completion error: {0}")]
    Completion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, malformed model structure, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A record that must exist was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The model produced no usable search query.
    #[error("query formulation failed: {0}")]
    Formulation(String),

    /// Both the formulated and the simplified query returned nothing.
    #[error("no search results for '{query}' (fallback '{fallback_query}')")]
    NoSearchResults {
        query: String,
        fallback_query: String,
    },

    /// Every scrape attempt failed.
    #[error("no usable sources: all {attempted} scrape attempts failed")]
    NoUsableSources { attempted: usize },

    /// A status change that would move a record backwards.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PapermillError>;

impl PapermillError {
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

    /// Shorthand for storage-layer failures.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
