//! The preload engine proper.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use preload_api::ApiClient;
use preload_docker::{CreateContainerRequest, DockerClient, HostConfig};

use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink, SpinnerAction};

/// Runner image that performs the actual data injection.
pub const RUNNER_IMAGE: &str = "balena/balena-preload:latest";

/// Mount point of the target image inside the runner.
const IMAGE_MOUNT: &str = "/img/app.img";

/// Mount point of the splash image inside the runner.
const SPLASH_MOUNT: &str = "/img/splash.png";

/// Display name of the preparation spinner.
const PREPARING: &str = "Preparing image";

/// Three-phase engine contract.
///
/// The caller owns the ordering: `prepare` completes before `preload`
/// starts, and `cleanup` is invoked exactly once per run. All phases take
/// `&self` so cleanup may overlap an abandoned phase; implementations must
/// make that safe.
#[async_trait]
pub trait PreloadEngine: Send + Sync + 'static {
    /// Resolves metadata and provisions the run's resources.
    async fn prepare(&self) -> Result<()>;

    /// Performs the data injection. The dominant-cost phase; emits most
    /// telemetry events.
    async fn preload(&self) -> Result<()>;

    /// Releases the run's resources. Safe to call at any point after
    /// construction, including concurrently with an abandoned phase.
    async fn cleanup(&self) -> Result<()>;
}

/// What the engine needs to know about one run.
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    pub app_id: u64,
    pub image: PathBuf,
    pub commit: Option<String>,
    pub splash_image: Option<PathBuf>,
    pub check_arch: bool,
    pub extra_certificates: Vec<PathBuf>,
}

/// Container-backed engine implementation.
///
/// `prepare` resolves the application and release, checks architecture
/// compatibility, and creates the runner container with the target image
/// bind-mounted; `preload` runs it and relays its telemetry; `cleanup`
/// tears the container down.
pub struct Preloader {
    api: ApiClient,
    docker: DockerClient,
    config: PreloadConfig,
    sink: Arc<dyn EventSink>,
    /// Runner container id, filled in by `prepare`, taken by `cleanup`.
    container: Mutex<Option<String>>,
}

impl Preloader {
    /// Creates an engine instance from provisioned clients.
    pub fn new(
        api: ApiClient,
        docker: DockerClient,
        config: PreloadConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            api,
            docker,
            config,
            sink,
            container: Mutex::new(None),
        }
    }

    async fn prepare_inner(&self) -> Result<()> {
        self.docker.ping().await?;

        if !self.config.image.exists() {
            return Err(EngineError::Domain(format!(
                "image not found: {}",
                self.config.image.display()
            )));
        }

        let app = self.api.application(self.config.app_id).await?;
        let commit = self.config.commit.as_deref().unwrap_or("latest");
        let release = self.api.release(app.id, commit).await?;
        info!(app = %app.app_name, commit = %release.commit, "resolved release");

        if self.config.check_arch {
            let server = self.docker.version().await?;
            if !arch_compatible(&app.arch, &server.arch) {
                return Err(EngineError::Domain(format!(
                    "architecture mismatch: application {} is {}, runtime is {}",
                    app.app_name, app.arch, server.arch
                )));
            }
        }

        let mut binds = vec![format!("{}:{IMAGE_MOUNT}", self.config.image.display())];
        if let Some(splash) = &self.config.splash_image {
            binds.push(format!("{}:{SPLASH_MOUNT}", splash.display()));
        }
        for (i, cert) in self.config.extra_certificates.iter().enumerate() {
            binds.push(format!(
                "{}:/usr/local/share/ca-certificates/preload-{i}.crt",
                cert.display()
            ));
        }

        let request = CreateContainerRequest {
            image: RUNNER_IMAGE.to_string(),
            cmd: vec![],
            env: vec![
                format!("APP_ID={}", app.id),
                format!("COMMIT={}", release.commit),
            ],
            host_config: Some(HostConfig {
                binds,
                privileged: true,
            }),
        };

        let name = runner_name();
        let created = self.docker.create_container(Some(&name), &request).await?;
        for warning in &created.warnings {
            warn!(warning = %warning, "runtime warning");
        }
        debug!(container = %created.id, "runner created");

        *self.container.lock().await = Some(created.id);
        Ok(())
    }
}

#[async_trait]
impl PreloadEngine for Preloader {
    async fn prepare(&self) -> Result<()> {
        self.sink.spinner(PREPARING, SpinnerAction::Start);
        let result = self.prepare_inner().await;
        self.sink.spinner(PREPARING, SpinnerAction::Stop);
        result
    }

    async fn preload(&self) -> Result<()> {
        let id = self
            .container
            .lock()
            .await
            .clone()
            .ok_or_else(|| EngineError::State("preload invoked before prepare".to_string()))?;

        self.docker.start_container(&id).await?;

        let mut lines = LineBuffer::default();
        let mut runner_error: Option<String> = None;
        let sink = &self.sink;

        self.docker
            .stream_logs(&id, true, |frame| {
                for line in lines.push(frame) {
                    match Event::from_json_line(&line) {
                        Some(Event::Progress { name, percentage }) => {
                            sink.progress(&name, percentage);
                        }
                        Some(Event::Spinner { name, action }) => sink.spinner(&name, action),
                        None => match error_line(&line) {
                            Some(message) => runner_error = Some(message),
                            None => debug!(line = %line.trim_end(), "runner output"),
                        },
                    }
                }
            })
            .await?;

        if let Some(line) = lines.take_remainder() {
            if let Some(message) = error_line(&line) {
                runner_error = Some(message);
            }
        }

        let status = self.docker.wait_container(&id).await?;
        if status != 0 {
            return Err(EngineError::Domain(runner_error.unwrap_or_else(|| {
                format!("preload runner exited with status {status}")
            })));
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        // Taking the id makes an overlapping second invocation a no-op.
        let id = self.container.lock().await.take();
        let Some(id) = id else {
            debug!("nothing to clean up");
            return Ok(());
        };

        if let Err(e) = self.docker.kill_container(&id, "SIGKILL").await {
            warn!(container = %id, error = %e, "failed to kill runner");
        }
        self.docker.remove_container(&id, true).await?;
        debug!(container = %id, "runner removed");
        Ok(())
    }
}

/// Generates a unique runner container name.
fn runner_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("preload-{}", &id[..12])
}

/// Extracts the message of a runner `{"error": ...}` line.
fn error_line(line: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorLine {
        error: String,
    }
    serde_json::from_str::<ErrorLine>(line.trim())
        .ok()
        .map(|e| e.error)
}

/// Normalizes an architecture name to runtime format.
fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "armv7l" | "armv7hf" => "arm",
        a => a,
    }
}

/// Returns whether an application built for `app_arch` can be preloaded on
/// a runtime of `server_arch`.
///
/// Exact matches aside, a 64-bit runtime accepts the corresponding 32-bit
/// application architectures.
fn arch_compatible(app_arch: &str, server_arch: &str) -> bool {
    let app = normalize_arch(app_arch);
    let server = normalize_arch(server_arch);
    match (app, server) {
        (a, s) if a == s => true,
        ("i386", "amd64") => true,
        ("arm" | "rpi", "arm64") => true,
        ("rpi", "arm") => true,
        _ => false,
    }
}

/// Splits a byte stream into complete lines across frame boundaries.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and drains every complete line it closes.
    fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(data);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Returns the trailing partial line, if any.
    fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
