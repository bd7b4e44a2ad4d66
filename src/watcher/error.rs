//! Error types for watch setup and listener refreshes.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while registering a listener with the coordinator.
#[derive(Error, Debug)]
pub enum WatchError {
    /// A configured root is a symlink that cannot be resolved. A root that
    /// points nowhere has no sensible fallback, so setup stops here rather
    /// than silently watching nothing.
    #[error("cannot resolve watch root {path}: {source}")]
    RootResolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS notification backend could not be created.
    #[error("failed to initialize watch backend: {0}")]
    Backend(#[from] notify::Error),
}

/// A listener failed to refresh.
///
/// Carried verbatim from the listener through `notify()` to whoever
/// triggered the cycle. The HTTP filter renders it to the client; nothing
/// in between rewraps or summarizes it.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RefreshError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RefreshError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The headline message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn refresh_error_preserves_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing Makefile");
        let err = RefreshError::with_source("rebuild failed", io);

        assert_eq!(err.to_string(), "rebuild failed");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("missing Makefile".to_string())
        );
    }

    #[test]
    fn refresh_error_without_source() {
        let err = RefreshError::new("template parse error");
        assert_eq!(err.message(), "template parse error");
        assert!(err.source().is_none());
    }
}
