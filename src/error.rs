//! Unified error types for tweetpack.
//!
//! This module provides a single [`TweetpackError`] enum that covers all error
//! cases in the library.
//!
//! # Error Handling Philosophy
//!
//! Only fatal setup problems surface as errors: a directory that is not an
//! archive, or an archive whose required files cannot be located or parsed.
//! Everything that can degrade gracefully (a failed lookup batch, a missing
//! media file, an uncopyable file) is logged and the pipeline continues with
//! the defined fallback behavior instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A specialized [`Result`] type for tweetpack operations.
pub type Result<T> = std::result::Result<T, TweetpackError>;

/// The error type for all tweetpack operations.
///
/// Each variant contains context about what went wrong and, where applicable,
/// the underlying source error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TweetpackError {
    /// An I/O error occurred.
    ///
    /// This typically happens when a required archive file cannot be read,
    /// or the output directory cannot be created.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing/serialization error outside of a specific archive file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error.
    #[cfg(feature = "lookup")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The directory does not look like an extracted Twitter archive.
    ///
    /// The marker file `data/account.js` is the first thing checked; without
    /// it there is nothing to normalize and the run aborts.
    #[error("not a Twitter archive: missing marker file {}", .0.display())]
    MissingMarker(PathBuf),

    /// A required file or directory pattern matched nothing.
    #[error("no {what} matching {patterns:?} in {}", dir.display())]
    NoMatch {
        /// What was being looked for (e.g. "media directory")
        what: &'static str,
        /// The name patterns that were tried
        patterns: &'static [&'static str],
        /// The directory that was searched
        dir: PathBuf,
    },

    /// A pattern that must match exactly one entry matched several.
    #[error("multiple {what} matching {patterns:?} in {}", dir.display())]
    AmbiguousMatch {
        what: &'static str,
        patterns: &'static [&'static str],
        dir: PathBuf,
    },

    /// Failed to parse one of the archive's `.js`-wrapped JSON files.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// The file that failed to parse
        path: PathBuf,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A file parsed as JSON but does not have the expected shape.
    ///
    /// This occurs when `account.js` lacks the `account.username` field.
    #[error("invalid {what} structure in {}", path.display())]
    InvalidStructure {
        /// What structure was expected
        what: &'static str,
        /// The offending file
        path: PathBuf,
    },
}

impl TweetpackError {
    /// Creates a parse error for an archive source file.
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        TweetpackError::Parse {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(what: &'static str, path: impl Into<PathBuf>) -> Self {
        TweetpackError::InvalidStructure {
            what,
            path: path.into(),
        }
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self, TweetpackError::Io(_))
    }

    /// Returns `true` if this error means the directory is not an archive.
    pub fn is_missing_marker(&self) -> bool {
        matches!(self, TweetpackError::MissingMarker(_))
    }

    /// Returns `true` if this is a parse or structure error.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            TweetpackError::Parse { .. } | TweetpackError::InvalidStructure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = TweetpackError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_missing_marker_display() {
        let err = TweetpackError::MissingMarker(PathBuf::from("/archive/data/account.js"));
        let display = err.to_string();
        assert!(display.contains("not a Twitter archive"));
        assert!(display.contains("account.js"));
        assert!(err.is_missing_marker());
    }

    #[test]
    fn test_no_match_display() {
        let err = TweetpackError::NoMatch {
            what: "media directory",
            patterns: &["tweet_media", "tweets_media"],
            dir: PathBuf::from("/archive/data"),
        };
        let display = err.to_string();
        assert!(display.contains("media directory"));
        assert!(display.contains("tweet_media"));
    }

    #[test]
    fn test_ambiguous_match_display() {
        let err = TweetpackError::AmbiguousMatch {
            what: "media directory",
            patterns: &["tweet_media", "tweets_media"],
            dir: PathBuf::from("/archive/data"),
        };
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_parse_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = TweetpackError::parse("/archive/data/tweets.js", json_err);
        let display = err.to_string();
        assert!(display.contains("tweets.js"));
        assert!(err.is_parse());
    }

    #[test]
    fn test_invalid_structure_display() {
        let err = TweetpackError::invalid_structure("account record", "/archive/data/account.js");
        assert!(err.to_string().contains("account record"));
        assert!(err.is_parse());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TweetpackError::parse("/tmp/x.js", json_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_methods() {
        let io_err = TweetpackError::Io(io::Error::new(io::ErrorKind::NotFound, ""));
        assert!(io_err.is_io());
        assert!(!io_err.is_parse());
        assert!(!io_err.is_missing_marker());
    }
}
