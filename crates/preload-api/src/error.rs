//! Error types for remote API operations.

use preload_error::PreloadError;
use thiserror::Error;

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur talking to the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential exchange or authorization failure.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API reported a failure.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid client configuration (endpoint, proxy).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed response body.
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error persisting session state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ApiError> for PreloadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(msg) => PreloadError::Auth(msg),
            ApiError::NotFound(msg) => PreloadError::Domain(format!("not found: {msg}")),
            ApiError::Api { status, message } => {
                PreloadError::Domain(format!("API error ({status}): {message}"))
            }
            ApiError::Config(msg) => PreloadError::Usage(msg),
            err @ (ApiError::Http(_) | ApiError::Json(_) | ApiError::Io(_)) => {
                PreloadError::unexpected(anyhow::Error::new(err).context("remote API request"))
            }
        }
    }
}
