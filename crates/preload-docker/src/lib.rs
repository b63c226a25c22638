//! Container runtime client handle for preload runs.
//!
//! Speaks the Docker-compatible HTTP API over a Unix socket. Only the
//! operations the preload engine needs are exposed: daemon liveness and
//! version, image inspection, and the create/start/wait/kill/remove
//! container lifecycle plus multiplexed log streaming.

mod client;
mod error;

pub use client::{
    ContainerWaitResponse, CreateContainerRequest, CreateContainerResponse, DockerClient,
    HostConfig, ImageInspect, VersionInfo, DEFAULT_SOCKET_PATH,
};
pub use error::{DockerError, Result};
