//! Client provisioning: an authenticated remote API client bound to a
//! disposable per-run state directory, plus the container runtime handle.

use tempfile::TempDir;

use preload_api::{api_base_url, ApiClient, DEFAULT_ENDPOINT};
use preload_docker::DockerClient;
use preload_error::PreloadError;

use crate::options::{Credentials, Env, Options};

/// Environment variable overriding the remote service endpoint.
const ENDPOINT_VAR: &str = "BALENARC_BALENA_URL";

/// Legacy alias of [`ENDPOINT_VAR`].
const LEGACY_ENDPOINT_VAR: &str = "RESINRC_RESIN_URL";

/// One run's provisioned clients.
#[derive(Debug)]
pub struct Clients {
    pub api: ApiClient,
    pub docker: DockerClient,
    /// Private API state directory. Holding the guard keeps it alive for
    /// the whole session; dropping it removes the directory.
    pub work_dir: TempDir,
}

/// Resolves the remote endpoint from the environment.
fn endpoint(env: &Env) -> &str {
    env.get(ENDPOINT_VAR)
        .or_else(|| env.get(LEGACY_ENDPOINT_VAR))
        .unwrap_or(DEFAULT_ENDPOINT)
}

/// Provisions the clients for one run.
///
/// A fresh temporary directory scopes the API client's session state to
/// this run, so concurrent or repeated runs never share cached
/// credentials. A token credential is exchanged here; an auth failure
/// propagates unrecovered. Runtime client construction performs no I/O.
///
/// # Errors
///
/// Temporary-directory creation failure is fatal and unretried
/// ([`PreloadError::Unexpected`]); a rejected token is
/// [`PreloadError::Auth`].
pub async fn provision(options: &Options, env: &Env) -> preload_error::Result<Clients> {
    let work_dir = tempfile::Builder::new()
        .prefix("preload-")
        .tempdir()
        .map_err(|e| {
            PreloadError::unexpected(
                anyhow::Error::new(e).context("failed to create working directory"),
            )
        })?;

    let base_url = api_base_url(endpoint(env));
    tracing::debug!(api = %base_url, "provisioning clients");

    let mut api = ApiClient::new(base_url, work_dir.path());
    if let Some(proxy) = &options.proxy {
        api = api.with_proxy(proxy)?;
    }

    match &options.credentials {
        Credentials::Token(token) => {
            api.login_with_token(token).await?;
        }
        Credentials::ApiKey(key) => api.use_api_key(key),
    }

    let docker = match env.get("DOCKER_HOST") {
        Some(host) => DockerClient::from_host(host),
        None => DockerClient::new(),
    };

    Ok(Clients {
        api,
        docker,
        work_dir,
    })
}
