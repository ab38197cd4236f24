//! Configuration types and loading
//!
//! Config path precedence: `--config` > `CONFIG_PATH` env > `dep-sync.toml`.
//! Secrets are never read from the TOML itself: the client secret comes from
//! GRAPH_CLIENT_SECRET or `client_secret_file`, and GRAPH_ACCESS_TOKEN supplies
//! a pre-acquired bearer token that bypasses client credentials entirely.

use common::Secret;
use graph_auth::{AUTHORITY_URL, AppCredentials, GRAPH_BASE_URL, TokenSource};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "dep-sync.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub removal: RemovalConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Graph endpoint and app registration
#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Path to a file holding the client secret (alternative to GRAPH_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            authority_url: default_authority_url(),
            tenant_id: None,
            client_id: None,
            client_secret_file: None,
            timeout_secs: default_timeout(),
            client_secret: None,
            access_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemovalConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
        }
    }
}

/// Prometheus exporter; disabled unless `listen_addr` is set
#[derive(Debug, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

fn default_base_url() -> String {
    GRAPH_BASE_URL.to_string()
}

fn default_authority_url() -> String {
    AUTHORITY_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment secrets.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load the file at `cli_path` or CONFIG_PATH, or the default file.
    ///
    /// Only the default file may be absent, in which case every setting falls
    /// back to its default and credentials must come from the environment.
    pub fn resolve(cli_path: Option<&str>) -> common::Result<Self> {
        let explicit = cli_path.is_some() || std::env::var_os("CONFIG_PATH").is_some();
        let path = Self::resolve_path(cli_path);
        if !explicit && !path.exists() {
            return Self::parse("");
        }
        Self::load(&path)
    }

    fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        for (name, url) in [
            ("base_url", &config.graph.base_url),
            ("authority_url", &config.graph.authority_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.graph.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.removal.settle_delay_secs == 0 {
            return Err(common::Error::Config(
                "settle_delay_secs must be greater than 0".into(),
            ));
        }

        config.graph.access_token = std::env::var("GRAPH_ACCESS_TOKEN")
            .ok()
            .and_then(|token| Secret::from_trimmed(&token));

        // Env var takes precedence over file
        if let Some(secret) = std::env::var("GRAPH_CLIENT_SECRET")
            .ok()
            .and_then(|s| Secret::from_trimmed(&s))
        {
            config.graph.client_secret = Some(secret);
        } else if let Some(ref secret_file) = config.graph.client_secret_file {
            let raw = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.graph.client_secret = Secret::from_trimmed(&raw);
        }

        if config.graph.access_token.is_none() {
            config.graph.app_credentials()?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.removal.settle_delay_secs)
    }
}

impl GraphConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn app_credentials(&self) -> common::Result<AppCredentials> {
        let missing = |what: &str| common::Error::MissingCredential(format!(
            "{what} is required unless GRAPH_ACCESS_TOKEN is set"
        ));
        let tenant_id = self.tenant_id.clone().ok_or_else(|| missing("graph.tenant_id"))?;
        let client_id = self.client_id.clone().ok_or_else(|| missing("graph.client_id"))?;
        let secret = self.client_secret.clone().ok_or_else(|| {
            missing("GRAPH_CLIENT_SECRET or graph.client_secret_file")
        })?;
        Ok(AppCredentials::new(tenant_id, client_id, secret).with_authority(&self.authority_url))
    }

    /// Bearer token provider for Graph requests.
    pub fn token_source(&self) -> common::Result<TokenSource> {
        match &self.access_token {
            Some(token) => Ok(TokenSource::fixed(token.clone())),
            None => Ok(TokenSource::client_credentials(self.app_credentials()?)),
        }
    }
}
