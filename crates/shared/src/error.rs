//! Error types for Snapvault.
//!
//! Library crates use [`SnapvaultError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Snapvault operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapvaultError {
    /// Configuration loading or validation error. Fatal at startup only.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching an image.
    #[error("network error: {0}")]
    Network(String),

    /// Search index unreachable or returned a server error.
    /// Escalated per item; a round never aborts on it.
    #[error("store unavailable: {0}")]
    Store(String),

    /// Encoder service transport or protocol error.
    #[error("encoder error: {0}")]
    Encode(String),

    /// Payload the encoder rejected as undecodable. Re-attempted every
    /// round; there is no permanently-failed marker.
    #[error("bad payload: {message}")]
    Payload { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// In-flight item abandoned after its timeout. Treated exactly like
    /// any other per-item failure.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SnapvaultError>;

impl SnapvaultError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a payload error from any displayable message.
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload {
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

    /// Whether this error should stop the process rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
