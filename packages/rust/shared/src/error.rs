//! Error types for kbinstall.
//!
//! Library crates use [`KbError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Errors fall into two scopes. Resolver-level errors ([`KbError::InvalidMode`],
//! [`KbError::AmbiguousTarget`]) reject the whole install request before any
//! target is touched. Everything else is scoped to a single source/target pair
//! and is recorded in that pair's result.

use std::path::PathBuf;

/// Top-level error type for all kbinstall operations.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// The requested install mode is not recognized.
    #[error("invalid install mode '{mode}': expected 'single', 'merge', or 'isolated-subdirectories'")]
    InvalidMode { mode: String },

    /// No target path could be determined for the request.
    #[error("ambiguous target {path:?}: {reason}")]
    AmbiguousTarget { path: PathBuf, reason: String },

    /// The source directory is not a well-formed KB.
    #[error("invalid source KB {path:?}: {reason}")]
    SourceInvalid { path: PathBuf, reason: String },

    /// A catalog file exists but its contents are malformed.
    #[error("corrupt catalog {path:?}: {reason}")]
    CatalogCorrupt { path: PathBuf, reason: String },

    /// The computed target already holds content and overwrite was not authorized.
    #[error("target {path:?} already exists and is not empty; pass --force to merge into it")]
    TargetExists { path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbError>;

impl KbError {
    pub fn ambiguous_target(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AmbiguousTarget {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn source_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn catalog_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CatalogCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Stable machine-readable code used in JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMode { .. } => "INVALID_MODE",
            Self::AmbiguousTarget { .. } => "AMBIGUOUS_TARGET",
            Self::SourceInvalid { .. } => "SOURCE_INVALID",
            Self::CatalogCorrupt { .. } => "CATALOG_CORRUPT",
            Self::TargetExists { .. } => "TARGET_EXISTS",
            Self::Io { .. } => "IO_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Whether this error aborts the whole request rather than a single pair.
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, Self::InvalidMode { .. } | Self::AmbiguousTarget { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KbError::config("missing [defaults] table");
        assert_eq!(err.to_string(), "config error: missing [defaults] table");

        let err = KbError::InvalidMode {
            mode: "mirror".into(),
        };
        assert!(err.to_string().contains("'mirror'"));

        let err = KbError::TargetExists {
            path: PathBuf::from("/tmp/out/docs-kb"),
        };
        assert!(err.to_string().contains("--force"));
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            KbError::InvalidMode { mode: "x".into() }.code(),
            "INVALID_MODE"
        );
        assert_eq!(
            KbError::source_invalid("/src", "no catalog").code(),
            "SOURCE_INVALID"
        );
        assert_eq!(
            KbError::io("/x", std::io::Error::other("boom")).code(),
            "IO_ERROR"
        );
    }

    #[test]
    fn only_resolver_errors_are_request_fatal() {
        assert!(KbError::InvalidMode { mode: "x".into() }.is_request_fatal());
        assert!(KbError::ambiguous_target("/out", "not a directory").is_request_fatal());
        assert!(!KbError::TargetExists { path: "/out/a".into() }.is_request_fatal());
        assert!(!KbError::catalog_corrupt("/a/catalog.json", "bad").is_request_fatal());
    }
}
