//! Error types for Paperboy.
//!
//! Library crates use [`PaperboyError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Paperboy operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperboyError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error that is not tied to a single article or image.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or selector error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, bad file name, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The front page yielded no article links.
    #[error("no article links discovered at {source_url}")]
    DiscoveryEmpty { source_url: String },

    /// A single article could not be extracted.
    #[error("fetch failed for {url} (group {group}): {cause}")]
    FetchFailed {
        url: String,
        group: String,
        cause: String,
    },

    /// A single image or cover download returned a non-success status.
    #[error("download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    /// The extraction endpoint answered with something that is not the expected JSON.
    #[error("malformed response for {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// The final e-book could not be written.
    #[error("could not write artifact {path:?}: {message}")]
    ArtifactWriteFailed { path: PathBuf, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperboyError>;

impl PaperboyError {
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

    /// Create an artifact write error for the given output path.
    pub fn artifact(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ArtifactWriteFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// Per-article and per-image failures are recorded and skipped; only
    /// failures that prevent producing the artifact are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Io { .. } | Self::ArtifactWriteFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PaperboyError::config("missing front page URL");
        assert_eq!(err.to_string(), "config error: missing front page URL");

        let err = PaperboyError::DownloadFailed {
            url: "https://img.example.com/a.jpg".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "download failed for https://img.example.com/a.jpg: HTTP 404"
        );
    }

    #[test]
    fn fetch_failed_mentions_group() {
        let err = PaperboyError::FetchFailed {
            url: "https://news.example.com/a".into(),
            group: "Sports".into(),
            cause: "HTTP 500".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Sports"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn only_artifact_level_errors_are_fatal() {
        assert!(PaperboyError::artifact("/tmp/out.epub", "disk full").is_fatal());
        assert!(PaperboyError::config("bad").is_fatal());
        assert!(
            !PaperboyError::DiscoveryEmpty {
                source_url: "https://news.example.com".into()
            }
            .is_fatal()
        );
        assert!(
            !PaperboyError::MalformedResponse {
                url: "u".into(),
                message: "not json".into()
            }
            .is_fatal()
        );
    }
}
