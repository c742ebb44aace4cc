use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};
use crate::util::env_optional;

pub const API_KEY_ENV: &str = "FASTOPENDATA_API_KEY";
pub const URL_ENV: &str = "FASTOPENDATA_URL";
pub const TIMEOUT_ENV: &str = "FASTOPENDATA_TIMEOUT";
pub const WORKERS_ENV: &str = "FASTOPENDATA_WORKERS";
pub const CONFIG_ENV: &str = "FASTOPENDATA_CONFIG";

const DEFAULT_SCHEME: &str = "https";
const DEFAULT_HOST: &str = "fastopendata.com";
const DEFAULT_PORT: u16 = 443;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

impl FileConfig {
    fn base_url(&self) -> Option<String> {
        let server = &self.server;
        if server.scheme.is_none() && server.host.is_none() && server.port.is_none() {
            return None;
        }
        Some(format!(
            "{}://{}:{}",
            server.scheme.as_deref().unwrap_or(DEFAULT_SCHEME),
            server.host.as_deref().unwrap_or(DEFAULT_HOST),
            server.port.unwrap_or(DEFAULT_PORT)
        ))
    }
}

/// Reads a JSON config file. A missing file yields the defaults; a malformed one is an error.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display()))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(err.into()),
    }
}

/// Explicit overrides, typically from command-line flags. Highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub workers: Option<usize>,
}

/// Connection settings handed to [`crate::Client`]. No global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: format!("{DEFAULT_SCHEME}://{DEFAULT_HOST}:{DEFAULT_PORT}"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workers: 1,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Layers defaults, the config file, the environment, then `overrides`.
    ///
    /// Does not validate; call [`ClientConfig::validate`] before issuing lookups.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let path = overrides
            .config_path
            .clone()
            .or_else(|| env_optional(CONFIG_ENV).map(PathBuf::from));
        let file = match path {
            Some(path) => load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::layer(&file, overrides, env_optional)
    }

    fn layer(
        file: &FileConfig,
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = ClientConfig::default();

        if let Some(url) = file.base_url() {
            config.base_url = url;
        }
        if let Some(key) = &file.client.api_key {
            config.api_key = key.clone();
        }
        if let Some(timeout) = file.client.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(workers) = file.client.workers {
            config.workers = workers;
        }

        if let Some(key) = env(API_KEY_ENV) {
            config.api_key = key;
        }
        if let Some(url) = env(URL_ENV) {
            config.base_url = url;
        }
        if let Some(timeout) = parse_env(&env, TIMEOUT_ENV)? {
            config.timeout_secs = timeout;
        }
        if let Some(workers) = parse_env(&env, WORKERS_ENV)? {
            config.workers = workers;
        }

        if let Some(key) = &overrides.api_key {
            config.api_key = key.clone();
        }
        if let Some(url) = &overrides.base_url {
            config.base_url = url.clone();
        }
        if let Some(timeout) = overrides.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(workers) = overrides.workers {
            config.workers = workers;
        }
        Ok(config)
    }

    /// Checks everything a lookup needs: key, URL, worker count.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ClientError::Security(format!(
                "no API key configured; pass --api-key or export {API_KEY_ENV}. \
                 To get a free evaluation key, run `fastopendata get-api-key`"
            )));
        }
        self.endpoint()?;
        if self.workers == 0 {
            return Err(ClientError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Parsed base URL, always ending in `/` so relative joins append.
    pub fn endpoint(&self) -> Result<Url> {
        endpoint_url(&self.base_url)
    }
}

pub(crate) fn endpoint_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "unsupported scheme in {base_url}; expected http or https"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    env(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ClientError::Config(format!("Invalid {name}: {value}")))
        })
        .transpose()
}
