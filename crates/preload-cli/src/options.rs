//! Option resolution: command-line flags merged with the process
//! environment, flags winning for every recognized pair.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use preload_engine::PreloadConfig;
use preload_error::PreloadError;

/// Command-line flags.
///
/// Every option here except `--add-certificate` falls back to an
/// environment variable; the merge happens in [`Options::resolve`], not in
/// clap, so precedence stays testable against an injected snapshot.
#[derive(Debug, Parser)]
#[command(
    name = "preload",
    about = "Inject application data into a device OS image",
    version,
    disable_version_flag = true
)]
pub struct Cli {
    /// Application identifier (env: APP_ID)
    #[arg(long = "app", value_name = "ID")]
    pub app: Option<String>,

    /// Path to the target OS image (env: IMAGE)
    #[arg(long = "img", value_name = "PATH")]
    pub img: Option<PathBuf>,

    /// Auth token, exchanged for a session (env: API_TOKEN)
    #[arg(long = "api-token", value_name = "TOKEN")]
    pub api_token: Option<String>,

    /// API key attached to each request (env: API_KEY)
    #[arg(long = "api-key", value_name = "KEY")]
    pub api_key: Option<String>,

    /// Commit to preload; defaults to the latest successful release
    /// (env: COMMIT)
    #[arg(long, value_name = "HASH")]
    pub commit: Option<String>,

    /// Splash image to inject (env: SPLASH_IMAGE)
    #[arg(long = "splash-image", value_name = "PATH")]
    pub splash_image: Option<PathBuf>,

    /// Skip the architecture compatibility check (env: DONT_CHECK_ARCH)
    #[arg(long = "dont-check-arch")]
    pub dont_check_arch: bool,

    /// Additional CA certificate to inject; may be repeated
    #[arg(long = "add-certificate", value_name = "PATH")]
    pub add_certificate: Vec<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

/// Immutable snapshot of the process environment.
#[derive(Debug, Clone, Default)]
pub struct Env(HashMap<String, String>);

impl Env {
    /// Captures the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self(std::env::vars().collect())
    }

    /// Builds a snapshot from explicit pairs (used by tests).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// The credential form the run will authenticate with.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Exchanged for a session at provisioning time.
    Token(String),
    /// Attached to each request.
    ApiKey(String),
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Options {
    pub app_id: u64,
    pub image: PathBuf,
    pub credentials: Credentials,
    pub commit: Option<String>,
    pub splash_image: Option<PathBuf>,
    pub check_arch: bool,
    pub extra_certificates: Vec<PathBuf>,
    pub proxy: Option<String>,
}

impl Options {
    /// Merges flags with the environment and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`PreloadError::Usage`] when the application id, image path,
    /// or both credentials are missing after the merge, or when a value is
    /// malformed. The caller prints usage and exits without provisioning.
    pub fn resolve(cli: &Cli, env: &Env) -> preload_error::Result<Self> {
        let app = cli
            .app
            .clone()
            .or_else(|| env.get("APP_ID").map(String::from))
            .ok_or_else(|| PreloadError::usage("missing required option --app (or APP_ID)"))?;
        let app_id: u64 = app
            .parse()
            .map_err(|_| PreloadError::usage(format!("invalid application id: {app}")))?;

        let image = cli
            .img
            .clone()
            .or_else(|| env.get("IMAGE").map(PathBuf::from))
            .ok_or_else(|| PreloadError::usage("missing required option --img (or IMAGE)"))?;

        let token = cli
            .api_token
            .clone()
            .or_else(|| env.get("API_TOKEN").map(String::from));
        let key = cli
            .api_key
            .clone()
            .or_else(|| env.get("API_KEY").map(String::from));
        let credentials = match (token, key) {
            (Some(token), _) => Credentials::Token(token),
            (None, Some(key)) => Credentials::ApiKey(key),
            (None, None) => {
                return Err(PreloadError::usage(
                    "either --api-token or --api-key is required (or API_TOKEN / API_KEY)",
                ));
            }
        };

        let commit = cli
            .commit
            .clone()
            .or_else(|| env.get("COMMIT").map(String::from));
        let splash_image = cli
            .splash_image
            .clone()
            .or_else(|| env.get("SPLASH_IMAGE").map(PathBuf::from));

        let check_arch =
            !(cli.dont_check_arch || env.get("DONT_CHECK_ARCH").is_some_and(is_truthy));

        for cert in &cli.add_certificate {
            if !cert.exists() {
                return Err(PreloadError::usage(format!(
                    "certificate not found: {}",
                    cert.display()
                )));
            }
        }

        let proxy = env
            .get("HTTPS_PROXY")
            .or_else(|| env.get("HTTP_PROXY"))
            .map(String::from);

        Ok(Self {
            app_id,
            image,
            credentials,
            commit,
            splash_image,
            check_arch,
            extra_certificates: cli.add_certificate.clone(),
            proxy,
        })
    }

    /// Projects the engine's view of this configuration.
    #[must_use]
    pub fn engine_config(&self) -> PreloadConfig {
        PreloadConfig {
            app_id: self.app_id,
            image: self.image.clone(),
            commit: self.commit.clone(),
            splash_image: self.splash_image.clone(),
            check_arch: self.check_arch,
            extra_certificates: self.extra_certificates.clone(),
        }
    }
}

/// Interprets an environment variable as a boolean switch.
fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
