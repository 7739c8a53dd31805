//! Error types for docscrawl.
//!
//! Library crates use [`DocsCrawlError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docscrawl operations.
#[derive(Debug, thiserror::Error)]
pub enum DocsCrawlError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or page fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Sitemap, HTML or URL parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Crawl state file could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input (mixed seed domains, empty page set, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown/text conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// ZIP bundle creation error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Google Docs API error.
    #[error("google docs error: {0}")]
    GoogleDocs(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocsCrawlError>;

impl DocsCrawlError {
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
        let err = DocsCrawlError::config("max_workers must be at least 1");
        assert_eq!(err.to_string(), "config error: max_workers must be at least 1");

        let err = DocsCrawlError::validation("seeds span docs.a.com and docs.b.com");
        assert!(err.to_string().contains("docs.b.com"));

        let err = DocsCrawlError::io(
            "/tmp/state.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("state.json"));
    }
}
