//! Error types for javelin-core.

use thiserror::Error;

/// Result type for javelin-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in javelin-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Dependency resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Failed to parse a directive, coordinate or document.
    #[error("parse error: {0}")]
    Parse(String),

    /// JDK discovery or runtime build failed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Communication with the worker JVM failed.
    #[error("worker error: {0}")]
    Worker(String),

    /// Execution error outside of user code.
    #[error("execution error: {0}")]
    Execution(String),

    /// Execution was interrupted by user request.
    #[error("execution interrupted")]
    Interrupted,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error on the transport or worker channel.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Render the error together with a recovery hint, if one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Toolchain(_) => {
                Some("install a JDK (11 or newer) and set JAVA_HOME or JAVELIN_JAVA_HOME")
            }
            Error::Resolution(ResolutionError::Fetch { .. }) => {
                Some("check network access, or pass --offline to use only the local repository")
            }
            Error::Resolution(ResolutionError::NotFound { .. }) => {
                Some("check the coordinate spelling and the configured repositories")
            }
            Error::Worker(_) => Some("the worker JVM is restarted automatically on the next cell"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

/// Errors raised by the dependency resolver.
///
/// A resolution error is fatal only to the resolution call that raised it;
/// caches are never left half-written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// Unknown coordinate, missing file, or no version satisfying a range.
    #[error("not found: {coordinate} ({reason})")]
    NotFound { coordinate: String, reason: String },

    /// Network or IO failure while fetching from a repository.
    #[error("fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        retryable: bool,
    },

    /// Version requirements that cannot be satisfied together.
    #[error("version conflict for {artifact}: {message}")]
    Conflict { artifact: String, message: String },
}

impl ResolutionError {
    pub(crate) fn not_found(coordinate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            coordinate: coordinate.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_for_fetch() {
        let fetch = ResolutionError::Fetch {
            url: "https://repo/x".into(),
            message: "timeout".into(),
            retryable: true,
        };
        assert!(fetch.is_retryable());
        assert!(!ResolutionError::not_found("g:a:1", "missing").is_retryable());
    }

    #[test]
    fn test_hint_appended() {
        let err = Error::Toolchain("javac not found".into());
        let rendered = err.with_hint();
        assert!(rendered.contains("javac not found"));
        assert!(rendered.contains("hint:"));

        let plain = Error::Interrupted.with_hint();
        assert!(!plain.contains("hint:"));
    }
}
