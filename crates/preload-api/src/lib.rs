//! Remote API client for preload runs.
//!
//! A thin client for the cloud API this tool talks to: one-time token
//! exchange, per-request key auth, and the application/release lookups the
//! preload engine needs. The client keeps its session state (the exchanged
//! token) in a caller-supplied private directory so concurrent runs never
//! share credentials.

mod client;
mod error;
mod models;

pub use client::{api_base_url, ApiClient, DEFAULT_ENDPOINT};
pub use error::{ApiError, Result};
pub use models::{Application, Release, WhoAmI};
