//! HTTP client for the remote API.

use std::path::PathBuf;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{ApiError, Result};
use crate::models::{Application, Page, Release, WhoAmI};

/// Endpoint used when no override environment variable is set.
pub const DEFAULT_ENDPOINT: &str = "balena-cloud.com";

/// Commit reference that selects the newest successful release.
const LATEST: &str = "latest";

/// Request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Converts a configured endpoint to the API base URL.
///
/// A bare domain gains the `https://api.` prefix; an explicit `http(s)://`
/// URL is used as-is (trailing slashes stripped).
#[must_use]
pub fn api_base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://api.{endpoint}")
    }
}

/// How requests are authenticated.
#[derive(Debug, Clone)]
enum AuthMode {
    /// No credentials attached yet.
    None,
    /// Session token exchanged via [`ApiClient::login_with_token`].
    Bearer(String),
    /// API key appended to every request.
    ApiKey(String),
}

/// Client for the remote API.
///
/// Bound to one run: the exchanged session token is persisted under
/// `data_dir`, which callers point at a disposable per-run directory.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    data_dir: PathBuf,
    auth: AuthMode,
}

impl ApiClient {
    /// Creates a new client against `base_url`, keeping session state in
    /// `data_dir`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(base_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Self::build_client(None).expect("failed to create HTTP client"),
            base_url: base_url.into(),
            data_dir: data_dir.into(),
            auth: AuthMode::None,
        }
    }

    /// Routes all requests through the given proxy URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the proxy URL is invalid.
    pub fn with_proxy(mut self, proxy_url: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ApiError::Config(format!("invalid proxy URL {proxy_url}: {e}")))?;
        self.client = Self::build_client(Some(proxy))
            .map_err(|e| ApiError::Config(format!("failed to apply proxy {proxy_url}: {e}")))?;
        Ok(self)
    }

    fn build_client(proxy: Option<reqwest::Proxy>) -> reqwest::Result<Client> {
        let mut builder = Client::builder()
            .user_agent(concat!("preload/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(std::time::Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        builder.build()
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges a token for an authenticated session.
    ///
    /// Verifies the token against the whoami endpoint, persists it under
    /// the client's private state directory, and attaches it to every
    /// subsequent request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] if the API rejects the token. Never
    /// retried.
    #[instrument(skip(self, token))]
    pub async fn login_with_token(&mut self, token: &str) -> Result<WhoAmI> {
        let url = format!("{}/user/v1/whoami", self.base_url);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::Auth("token was rejected by the API".to_string()));
            }
            status if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(ApiError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let user: WhoAmI = response.json().await?;
        debug!(username = %user.username, "authenticated");

        tokio::fs::write(self.data_dir.join("token"), token).await?;
        self.auth = AuthMode::Bearer(token.to_string());
        Ok(user)
    }

    /// Switches the client to per-request API key auth.
    ///
    /// No exchange happens; the key is appended to every request.
    pub fn use_api_key(&mut self, key: impl Into<String>) {
        self.auth = AuthMode::ApiKey(key.into());
    }

    /// Fetches an application by id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the application does not exist or
    /// is not accessible with the current credentials.
    #[instrument(skip(self))]
    pub async fn application(&self, app_id: u64) -> Result<Application> {
        let url = format!(
            "{}/v6/application({app_id})?$select=id,app_name,arch",
            self.base_url
        );
        let mut page: Page<Application> = self.get_page(&url).await.map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound(format!("application {app_id}")),
            e => e,
        })?;
        page.d
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("application {app_id}")))
    }

    /// Resolves a release of an application by commit reference.
    ///
    /// The reference `"latest"` selects the newest successful release; any
    /// other value matches releases whose commit starts with it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if no matching release exists.
    #[instrument(skip(self))]
    pub async fn release(&self, app_id: u64, commit: &str) -> Result<Release> {
        let filter = release_filter(app_id, commit);
        let url = format!(
            "{}/v6/release?$select=id,commit,status&$filter={}&$orderby=created_at%20desc&$top=1",
            self.base_url,
            urlencoding::encode(&filter)
        );
        let mut page: Page<Release> = self.get_page(&url).await?;
        page.d.pop().ok_or_else(|| {
            ApiError::NotFound(format!("release \"{commit}\" of application {app_id}"))
        })
    }

    /// Performs an authenticated GET returning a collection page.
    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        debug!(url = %url, "GET");

        let mut request = self.client.get(url);
        match &self.auth {
            AuthMode::Bearer(token) => request = request.bearer_auth(token),
            AuthMode::ApiKey(key) => request = request.query(&[("apikey", key)]),
            AuthMode::None => {}
        }

        let response = request.send().await?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::Auth("request was rejected by the API".to_string()))
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(url.to_string())),
            status if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
            _ => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            }
        }
    }
}

/// Builds the release query filter for a commit reference.
fn release_filter(app_id: u64, commit: &str) -> String {
    use std::fmt::Write;

    let mut filter = format!("belongs_to__application eq {app_id} and status eq 'success'");
    if commit != LATEST {
        // OData escapes single quotes by doubling them.
        let commit = commit.replace('\'', "''");
        let _ = write!(filter, " and startswith(commit,'{commit}')");
    }
    filter
}
