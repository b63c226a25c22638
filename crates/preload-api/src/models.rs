//! Wire models for the remote API.

use serde::Deserialize;

/// Authenticated user, returned by the whoami endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    pub id: u64,
    pub username: String,
}

/// Application record.
#[derive(Debug, Clone, Deserialize)]
pub struct Application {
    pub id: u64,
    pub app_name: String,
    /// CPU architecture the application's releases are built for
    /// (e.g. "amd64", "aarch64", "armv7hf").
    pub arch: String,
}

/// Release record.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub commit: String,
    pub status: String,
}

/// Collection envelope used by the API for every resource query.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    pub d: Vec<T>,
}
