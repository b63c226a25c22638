//! HTTP client for the Docker-compatible runtime API over a Unix socket.

use std::path::{Path, PathBuf};

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{DockerError, Result};

/// Default socket path for the container runtime.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// API version prefix used on every request path.
const API_VERSION: &str = "v1.43";

/// Client for the container runtime's HTTP API.
///
/// A cheap handle: construction performs no I/O, each request opens its own
/// socket connection.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
}

impl DockerClient {
    /// Creates a client with the default socket path.
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    /// Creates a client with a custom socket path.
    pub fn with_socket(path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
        }
    }

    /// Creates a client from a `DOCKER_HOST`-style value.
    ///
    /// Accepts a `unix://` URL or a bare socket path.
    #[must_use]
    pub fn from_host(host: &str) -> Self {
        let path = host.strip_prefix("unix://").unwrap_or(host);
        Self::with_socket(path)
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Pings the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub async fn ping(&self) -> Result<()> {
        self.request(Method::GET, &format!("/{API_VERSION}/_ping"), None::<()>)
            .await?;
        Ok(())
    }

    /// Fetches runtime version information (including the server arch).
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or responds malformed.
    pub async fn version(&self) -> Result<VersionInfo> {
        self.get_json(&format!("/{API_VERSION}/version")).await
    }

    /// Inspects an image by name or id.
    ///
    /// # Errors
    ///
    /// Returns [`DockerError::NotFound`] if the image does not exist.
    pub async fn inspect_image(&self, name: &str) -> Result<ImageInspect> {
        self.get_json(&format!("/{API_VERSION}/images/{name}/json"))
            .await
    }

    /// Creates a container, optionally named.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the request.
    pub async fn create_container(
        &self,
        name: Option<&str>,
        request: &CreateContainerRequest,
    ) -> Result<CreateContainerResponse> {
        let name_param = name.map(|n| format!("?name={n}")).unwrap_or_default();
        let path = format!("/{API_VERSION}/containers/create{name_param}");
        let body = self.request(Method::POST, &path, Some(request)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Starts a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.request(
            Method::POST,
            &format!("/{API_VERSION}/containers/{id}/start"),
            None::<()>,
        )
        .await?;
        Ok(())
    }

    /// Waits for a container to exit and returns its status code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub async fn wait_container(&self, id: &str) -> Result<i64> {
        let body = self
            .request(
                Method::POST,
                &format!("/{API_VERSION}/containers/{id}/wait"),
                None::<()>,
            )
            .await?;
        let response: ContainerWaitResponse = serde_json::from_slice(&body)?;
        Ok(response.status_code)
    }

    /// Sends a signal to a container.
    ///
    /// Idempotent: an absent or already-stopped container is not an error,
    /// so cleanup can overlap a phase that is tearing the container down.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures other than 404/409.
    pub async fn kill_container(&self, id: &str, signal: &str) -> Result<()> {
        let path = format!("/{API_VERSION}/containers/{id}/kill?signal={signal}");
        let (status, body) = self.request_raw(Method::POST, &path, None::<()>).await?;
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    /// Removes a container.
    ///
    /// Idempotent like [`Self::kill_container`].
    ///
    /// # Errors
    ///
    /// Returns an error only for failures other than 404/409.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let path = format!("/{API_VERSION}/containers/{id}?force={force}");
        let (status, body) = self.request_raw(Method::DELETE, &path, None::<()>).await?;
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    /// Streams container logs, invoking the callback for each decoded frame.
    ///
    /// With `follow`, the stream ends when the container exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or the stream dies.
    pub async fn stream_logs<F>(&self, id: &str, follow: bool, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]),
    {
        let path = format!(
            "/{API_VERSION}/containers/{id}/logs?stdout=true&stderr=true&follow={follow}"
        );
        let mut sender = self.connect().await?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://localhost{path}"))
            .header("Host", "localhost")
            .body(Full::new(Bytes::new()))
            .map_err(|e| DockerError::Protocol(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| DockerError::Protocol(format!("failed to send request: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DockerError::NotFound(format!("container {id}")));
        }
        if !status.is_success() {
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| DockerError::Protocol(format!("failed to read response: {e}")))?
                .to_bytes();
            return Err(api_error(status, &body));
        }

        let mut body = response.into_body();
        let mut buffer: Vec<u8> = Vec::with_capacity(4096);

        while let Some(frame) = body.frame().await {
            let frame =
                frame.map_err(|e| DockerError::Protocol(format!("failed to read frame: {e}")))?;
            let Some(data) = frame.data_ref() else {
                continue;
            };
            buffer.extend_from_slice(data);
            while let Some((_, content)) = extract_log_frame(&buffer) {
                let frame_size = 8 + content.len();
                callback(content);
                buffer.drain(..frame_size);
            }
        }

        // A TTY container produces a raw, unframed stream.
        if !buffer.is_empty() && (buffer.len() < 8 || buffer[0] > 2) {
            callback(&buffer);
        }

        Ok(())
    }

    /// Opens a connection and performs the HTTP/1 handshake.
    async fn connect(&self) -> Result<hyper::client::conn::http1::SendRequest<Full<Bytes>>> {
        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| DockerError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let io = TokioIo::new(stream);
        let (sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DockerError::Protocol(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("runtime connection closed: {e}");
            }
        });

        Ok(sender)
    }

    /// Performs a request, treating any non-success status as an error.
    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<Bytes> {
        let (status, bytes) = self.request_raw(method, path, body).await?;
        match status {
            s if s.is_success() => Ok(bytes),
            StatusCode::NOT_FOUND => Err(DockerError::NotFound(runtime_message(&bytes))),
            s => Err(api_error(s, &bytes)),
        }
    }

    /// Performs a request, returning the status and body uninterpreted.
    async fn request_raw<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<(StatusCode, Bytes)> {
        debug!(method = %method, path = %path, "runtime request");

        let mut sender = self.connect().await?;

        let request = if let Some(body) = body {
            let body_bytes = serde_json::to_vec(&body)?;
            Request::builder()
                .method(method)
                .uri(format!("http://localhost{path}"))
                .header("Host", "localhost")
                .header("Content-Type", "application/json")
                .header("Content-Length", body_bytes.len())
                .body(Full::new(Bytes::from(body_bytes)))
        } else {
            Request::builder()
                .method(method)
                .uri(format!("http://localhost{path}"))
                .header("Host", "localhost")
                .body(Full::new(Bytes::new()))
        }
        .map_err(|e| DockerError::Protocol(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| DockerError::Protocol(format!("failed to send request: {e}")))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DockerError::Protocol(format!("failed to read response: {e}")))?
            .to_bytes();

        Ok((status, bytes))
    }

    /// Performs a GET request and decodes the JSON response.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::GET, path, None::<()>).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an API error from a non-success response.
fn api_error(status: StatusCode, body: &[u8]) -> DockerError {
    DockerError::Api {
        status: status.as_u16(),
        message: runtime_message(body),
    }
}

/// Extracts the `message` field the runtime wraps its errors in, falling
/// back to the raw body.
fn runtime_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
}

/// Extracts a single multiplexed log frame from a buffer.
///
/// Frame layout: [stream type (1 byte)][padding (3 bytes)][size (4 bytes BE)][data],
/// stream type 0 = stdin, 1 = stdout, 2 = stderr.
///
/// Returns (stream type, content) if a complete frame is available.
fn extract_log_frame(buffer: &[u8]) -> Option<(u8, &[u8])> {
    if buffer.len() < 8 {
        return None;
    }

    let stream_type = buffer[0];
    let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;

    let frame_end = 8 + size;
    if buffer.len() < frame_end {
        return None;
    }

    Some((stream_type, &buffer[8..frame_end]))
}

// =============================================================================
// Runtime API types
// =============================================================================

/// Runtime version information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
    /// Server architecture in runtime format (e.g. "amd64", "arm64").
    pub arch: String,
}

/// Image inspect response (the fields this tool reads).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
    pub architecture: String,
}

/// Create container request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerRequest {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
}

/// Host configuration for container creation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    pub privileged: bool,
}

/// Create container response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Container wait response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitResponse {
    pub status_code: i64,
}
