//! Integration tests for the runtime client against a mock Docker API
//! served over a Unix socket.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::RwLock;

use preload_docker::{CreateContainerRequest, DockerClient, DockerError, HostConfig};

/// Mock container record.
#[derive(Debug, Clone)]
struct MockContainer {
    image: String,
    state: String,
    exit_code: i64,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    next_id: u64,
}

type SharedState = Arc<RwLock<MockState>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateBody {
    image: String,
}

async fn ping() -> &'static str {
    "OK"
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "Version": "24.0.7",
        "ApiVersion": "1.43",
        "Arch": "amd64",
        "Os": "linux"
    }))
}

async fn inspect_image(Path(name): Path<String>) -> Result<Json<serde_json::Value>, StatusCode> {
    if name == "alpine" {
        Ok(Json(serde_json::json!({
            "Id": "sha256:abc123",
            "Architecture": "amd64"
        })))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn create_container(
    State(state): State<SharedState>,
    Json(body): Json<CreateBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut state = state.write().await;
    state.next_id += 1;
    let id = format!("{:064x}", state.next_id);
    state.containers.insert(
        id.clone(),
        MockContainer {
            image: body.image,
            state: "created".to_string(),
            exit_code: 0,
        },
    );
    (
        StatusCode::CREATED,
        Json(serde_json::json!({"Id": id, "Warnings": []})),
    )
}

async fn start_container(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    let mut state = state.write().await;
    if let Some(container) = state.containers.get_mut(&id) {
        container.state = "running".to_string();
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn wait_container(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut state = state.write().await;
    if let Some(container) = state.containers.get_mut(&id) {
        container.state = "exited".to_string();
        Ok(Json(serde_json::json!({"StatusCode": container.exit_code})))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn kill_container(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    let state = state.read().await;
    if state.containers.contains_key(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn remove_container(State(state): State<SharedState>, Path(id): Path<String>) -> StatusCode {
    let mut state = state.write().await;
    if state.containers.remove(&id).is_some() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn container_logs(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, StatusCode> {
    let state = state.read().await;
    if !state.containers.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }

    // Two multiplexed stdout frames.
    let mut output = Vec::new();
    for line in [&b"first line\n"[..], &b"second line\n"[..]] {
        output.extend_from_slice(&[1u8, 0, 0, 0]);
        output.extend_from_slice(&(line.len() as u32).to_be_bytes());
        output.extend_from_slice(line);
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/vnd.docker.raw-stream")
        .body(Body::from(output))
        .unwrap())
}

fn mock_router(state: SharedState) -> Router {
    Router::new()
        .route("/v1.43/_ping", get(ping))
        .route("/v1.43/version", get(version))
        .route("/v1.43/images/{name}/json", get(inspect_image))
        .route("/v1.43/containers/create", post(create_container))
        .route("/v1.43/containers/{id}/start", post(start_container))
        .route("/v1.43/containers/{id}/wait", post(wait_container))
        .route("/v1.43/containers/{id}/kill", post(kill_container))
        .route("/v1.43/containers/{id}/logs", get(container_logs))
        .route("/v1.43/containers/{id}", delete(remove_container))
        .with_state(state)
}

/// Starts the mock runtime on a Unix socket.
async fn start_mock_runtime(socket_path: PathBuf) -> SharedState {
    let state = SharedState::default();
    let router = mock_router(Arc::clone(&state));

    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path).expect("failed to bind Unix socket");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("mock runtime server error: {e}");
        }
    });

    state
}

fn basic_create_request() -> CreateContainerRequest {
    CreateContainerRequest {
        image: "alpine".to_string(),
        cmd: vec!["true".to_string()],
        env: vec![],
        host_config: Some(HostConfig {
            binds: vec!["/tmp/x.img:/img/app.img".to_string()],
            privileged: true,
        }),
    }
}

#[tokio::test]
async fn test_ping() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_ping_unreachable_socket() {
    let tmp = TempDir::new().unwrap();
    let client = DockerClient::with_socket(tmp.path().join("absent.sock"));
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, DockerError::Connect { .. }));
}

#[tokio::test]
async fn test_version_reports_arch() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let version = client.version().await.unwrap();
    assert_eq!(version.arch, "amd64");
    assert_eq!(version.api_version, "1.43");
}

#[tokio::test]
async fn test_inspect_image() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let image = client.inspect_image("alpine").await.unwrap();
    assert_eq!(image.architecture, "amd64");

    let err = client.inspect_image("missing").await.unwrap_err();
    assert!(matches!(err, DockerError::NotFound(_)));
}

#[tokio::test]
async fn test_container_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let created = client
        .create_container(Some("preload-test"), &basic_create_request())
        .await
        .unwrap();
    assert!(!created.id.is_empty());

    client.start_container(&created.id).await.unwrap();
    {
        let state = state.read().await;
        assert_eq!(state.containers[&created.id].state, "running");
        assert_eq!(state.containers[&created.id].image, "alpine");
    }

    let status = client.wait_container(&created.id).await.unwrap();
    assert_eq!(status, 0);

    client.remove_container(&created.id, true).await.unwrap();
    assert!(state.read().await.containers.is_empty());
}

#[tokio::test]
async fn test_wait_reports_nonzero_status() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let created = client
        .create_container(None, &basic_create_request())
        .await
        .unwrap();
    state
        .write()
        .await
        .containers
        .get_mut(&created.id)
        .unwrap()
        .exit_code = 3;

    assert_eq!(client.wait_container(&created.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_remove_and_kill_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let created = client
        .create_container(None, &basic_create_request())
        .await
        .unwrap();

    client.remove_container(&created.id, true).await.unwrap();
    // Second remove and a kill of the now-absent container are no-ops.
    client.remove_container(&created.id, true).await.unwrap();
    client.kill_container(&created.id, "SIGKILL").await.unwrap();
}

#[tokio::test]
async fn test_stream_logs_decodes_frames() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let created = client
        .create_container(None, &basic_create_request())
        .await
        .unwrap();

    let mut lines = Vec::new();
    client
        .stream_logs(&created.id, false, |frame| {
            lines.push(String::from_utf8_lossy(frame).into_owned());
        })
        .await
        .unwrap();

    assert_eq!(lines, vec!["first line\n", "second line\n"]);
}

#[tokio::test]
async fn test_stream_logs_missing_container() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("runtime.sock");
    let _state = start_mock_runtime(socket.clone()).await;

    let client = DockerClient::with_socket(&socket);
    let err = client
        .stream_logs("nope", false, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DockerError::NotFound(_)));
}
