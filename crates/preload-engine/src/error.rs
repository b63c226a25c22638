//! Error types for engine operations.

use preload_api::ApiError;
use preload_docker::DockerError;
use preload_error::PreloadError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during a preload phase.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Recognized failure (missing application, architecture mismatch,
    /// runner-reported error).
    #[error("{0}")]
    Domain(String),

    /// Lifecycle misuse or a dead phase task.
    #[error("invalid state: {0}")]
    State(String),

    /// Remote API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Container runtime failure.
    #[error(transparent)]
    Docker(#[from] DockerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for PreloadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Domain(msg) => PreloadError::Domain(msg),
            EngineError::Api(err) => err.into(),
            EngineError::Docker(err) => err.into(),
            err @ (EngineError::State(_) | EngineError::Io(_)) => {
                PreloadError::unexpected(anyhow::Error::new(err))
            }
        }
    }
}
