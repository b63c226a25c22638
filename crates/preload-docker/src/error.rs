//! Error types for container runtime operations.

use std::path::PathBuf;

use preload_error::PreloadError;
use thiserror::Error;

/// Result type alias for container runtime operations.
pub type Result<T> = std::result::Result<T, DockerError>;

/// Errors that can occur talking to the container runtime.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The daemon socket could not be reached.
    #[error("cannot connect to the container runtime at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The runtime reported a failure.
    #[error("runtime error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP-level failure (handshake, malformed request, truncated body).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed response body.
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DockerError> for PreloadError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::Connect { .. } => PreloadError::Domain(format!(
                "{err}\nIs the container runtime running?"
            )),
            DockerError::NotFound(msg) => PreloadError::Domain(format!("not found: {msg}")),
            DockerError::Api { status, .. } if status < 500 => {
                PreloadError::Domain(err.to_string())
            }
            err @ (DockerError::Api { .. } | DockerError::Protocol(_) | DockerError::Json(_)) => {
                PreloadError::unexpected(anyhow::Error::new(err).context("container runtime request"))
            }
        }
    }
}
