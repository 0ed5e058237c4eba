//! Error types for the analysis pipeline.
//!
//! Errors are categorized into two main types:
//!
//! - **`Error`**: top-level errors that halt an `analyze()` call (missing project
//!   root, database failures, rules-directory I/O).
//! - **`AnalysisError`**: per-file or per-descriptor errors that are collected but
//!   never halt analysis.
//!
//! ## Error philosophy
//!
//! The pipeline is best-effort: a single malformed file or a single malformed config
//! descriptor must never stop analysis of the rest of the project. Only infrastructure
//! failures (an unreadable cache database, a missing project root) abort early. When a
//! per-file error leaves a symbol's status in doubt, the shield pass treats that doubt
//! as protection, never as deletion (spec §7).

use std::path::PathBuf;
use thiserror::Error;

/// Result type for top-level pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures that prevent `analyze()` from completing.
#[derive(Debug, Error)]
pub enum Error {
    /// The project root does not exist or is not a directory.
    #[error("project root not found: {0}")]
    ProjectRootNotFound(PathBuf),

    /// The analysis cache database failed.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// A filesystem operation failed outside of per-file recoverable scanning.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tree-sitter grammar/parser setup failed (not a per-file parse failure).
    #[error("parser error: {0}")]
    Parser(String),

    /// Invalid analysis options.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Error encountered while processing a specific source file.
///
/// Collected during extraction and reference tracking; never halts the pipeline. The
/// file remains a graph node with no outgoing edges and contributes no entities.
#[derive(Debug, Clone)]
pub struct AnalysisError {
    pub path: PathBuf,
    pub kind: AnalysisErrorKind,
    pub message: String,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.message, self.kind)
    }
}

impl std::error::Error for AnalysisError {}

/// Categorization of per-file errors, 4xx/5xx style:
/// - Input problems are issues with the source file itself (user can fix).
/// - Internal problems are issues reading or caching the file (we need to fix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// Tree-sitter failed to produce a usable tree for this file.
    ParseFailed,
    /// The file's extension is not one of the supported languages.
    UnsupportedLanguage,
    /// The file's content is not valid UTF-8.
    EncodingError,
    /// The file could not be read from disk.
    IoError,
    /// A cache read or write failed for this file.
    CacheError,
}

impl std::fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailed => write!(f, "parse failed"),
            Self::UnsupportedLanguage => write!(f, "unsupported language"),
            Self::EncodingError => write!(f, "encoding error"),
            Self::IoError => write!(f, "I/O error"),
            Self::CacheError => write!(f, "cache error"),
        }
    }
}

impl AnalysisErrorKind {
    /// `true` for issues with the source file the user can fix.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ParseFailed | Self::UnsupportedLanguage | Self::EncodingError
        )
    }

    /// `true` for issues in our own I/O or caching.
    #[must_use]
    pub fn is_internal_error(&self) -> bool {
        matches!(self, Self::IoError | Self::CacheError)
    }
}

impl AnalysisError {
    #[must_use]
    pub fn new(path: PathBuf, kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse_failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(path, AnalysisErrorKind::ParseFailed, message)
    }

    #[must_use]
    pub fn unsupported_language(path: PathBuf) -> Self {
        let ext = path
            .extension()
            .map_or_else(|| "none".to_string(), |e| e.to_string_lossy().to_string());
        Self::new(
            path,
            AnalysisErrorKind::UnsupportedLanguage,
            format!("unsupported extension: {ext}"),
        )
    }

    #[must_use]
    pub fn encoding_error(path: PathBuf) -> Self {
        Self::new(path, AnalysisErrorKind::EncodingError, "file is not valid UTF-8")
    }

    #[must_use]
    pub fn io_error(path: PathBuf, error: &std::io::Error) -> Self {
        Self::new(path, AnalysisErrorKind::IoError, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_error_kind_categorization() {
        assert!(AnalysisErrorKind::ParseFailed.is_input_error());
        assert!(AnalysisErrorKind::UnsupportedLanguage.is_input_error());
        assert!(AnalysisErrorKind::EncodingError.is_input_error());
        assert!(!AnalysisErrorKind::ParseFailed.is_internal_error());

        assert!(AnalysisErrorKind::IoError.is_internal_error());
        assert!(AnalysisErrorKind::CacheError.is_internal_error());
        assert!(!AnalysisErrorKind::IoError.is_input_error());
    }

    #[test]
    fn analysis_error_display_includes_path_and_kind() {
        let error = AnalysisError::parse_failed(PathBuf::from("a/b.py"), "unexpected indent");
        let display = error.to_string();
        assert!(display.contains("a/b.py"));
        assert!(display.contains("unexpected indent"));
        assert!(display.contains("parse failed"));
    }

    #[test]
    fn unsupported_language_includes_extension() {
        let error = AnalysisError::unsupported_language(PathBuf::from("style.css"));
        assert!(error.message.contains("css"));
    }
}
