//! Shared error taxonomy for the preload workspace.
//!
//! Every terminal failure in this system is one of four kinds, and the
//! process exit behavior is decided by matching on the kind, never by
//! downcasting. Crate-specific error types (`ApiError`, `DockerError`,
//! `EngineError`) convert into [`PreloadError`] at the boundary where the
//! failure becomes terminal.
//!
//! # Usage
//!
//! ```rust
//! use preload_error::PreloadError;
//!
//! fn example() -> Result<(), PreloadError> {
//!     Err(PreloadError::domain("architecture mismatch"))
//! }
//! ```

mod taxonomy;

pub use taxonomy::PreloadError;

/// Result type alias using [`PreloadError`].
pub type Result<T> = std::result::Result<T, PreloadError>;
