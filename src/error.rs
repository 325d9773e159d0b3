//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the
//! CLI uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors ([`CatalogError`], [`DownloadError`], ...) for
//!   detailed handling
//!
//! # Example
//!
//! ```ignore
//! use music_courier::error::{Result, ResultExt};
//!
//! fn prepare(dir: &Path) -> Result<()> {
//!     std::fs::create_dir_all(dir).with_context("creating download directory")?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::player::PlayerError;
use crate::queue::QueueError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlayerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, DownloadError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Download(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, CatalogError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Catalog(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/path/to/file.flac");
        assert!(err.to_string().contains("/path/to/file.flac"));
    }

    #[test]
    fn test_subsystem_errors_convert() {
        let err: Error = DownloadError::Conversion("bad input".to_string()).into();
        assert!(matches!(err, Error::Download(_)));
        assert!(err.to_string().contains("bad input"));

        let err: Error = CatalogError::NotFound.into();
        assert!(matches!(err, Error::Catalog(_)));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(PlayerError::ChannelClosed).context("while playing track");
        let msg = err.to_string();
        assert!(msg.contains("while playing track"));
        assert!(msg.contains("Audio channel closed"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), DownloadError> = Err(DownloadError::Cancelled);
        let with_ctx = result.with_context("saving track");
        assert!(with_ctx.unwrap_err().to_string().contains("saving track"));
    }
}
