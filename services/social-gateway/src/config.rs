//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credential tokens resolve per entry from an env var, a file, or an inline
//! value, in that order; env/file keep secrets out of the TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use keypool::{ApiKey, PoolOptions};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    pub credentials: Vec<CredentialConfig>,
}

/// HTTP listener and upstream settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Base URL of the social-data aggregation service
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Credential pool tuning
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// One credential entry. Exactly one token source must resolve.
#[derive(Debug, Deserialize)]
pub struct CredentialConfig {
    pub label: String,
    /// Inline token. Accepted, but env/file keep secrets out of the TOML.
    #[serde(default)]
    token: Option<String>,
    /// Name of an environment variable holding the token.
    #[serde(default)]
    token_env: Option<String>,
    /// Path to a file holding the token.
    #[serde(default)]
    token_file: Option<PathBuf>,
    /// Resolved at load time, never deserialized.
    #[serde(skip)]
    resolved: Option<Secret<String>>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_error_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    60 * 60
}

impl Config {
    /// Load configuration from a TOML file and resolve credential secrets.
    ///
    /// Token resolution order per credential: `token_env` (if the variable
    /// is set and non-empty), then `token_file`, then inline `token`. A
    /// credential with no resolvable token is a configuration error.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.gateway.base_url.starts_with("http://")
            && !config.gateway.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.gateway.base_url
            )));
        }

        if config.gateway.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.credentials.is_empty() {
            return Err(common::Error::Config(
                "at least one [[credentials]] entry is required".into(),
            ));
        }

        for i in 0..config.credentials.len() {
            for j in (i + 1)..config.credentials.len() {
                if config.credentials[i].label == config.credentials[j].label {
                    return Err(common::Error::Config(format!(
                        "duplicate credential label: {}",
                        config.credentials[i].label
                    )));
                }
            }
        }

        for cred in &mut config.credentials {
            cred.resolved = Some(cred.resolve_token()?);
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
        PathBuf::from("social-gateway.toml")
    }

    /// Pool tuning translated into `keypool` terms.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            error_threshold: self.pool.error_threshold,
            cooldown: Duration::from_secs(self.pool.cooldown_secs),
            request_timeout: Duration::from_secs(self.gateway.request_timeout_secs),
        }
    }

    /// The resolved credential set for pool construction.
    pub fn api_keys(&self) -> Vec<ApiKey> {
        self.credentials
            .iter()
            .map(|c| {
                let token = c
                    .resolved
                    .as_ref()
                    .expect("tokens resolved during Config::load");
                ApiKey::new(c.label.clone(), token.expose().clone())
            })
            .collect()
    }
}

impl CredentialConfig {
    fn resolve_token(&self) -> common::Result<Secret<String>> {
        if let Some(ref var) = self.token_env
            && let Ok(value) = std::env::var(var)
        {
            let value = value.trim().to_owned();
            if !value.is_empty() {
                return Ok(Secret::new(value));
            }
        }

        if let Some(ref file) = self.token_file {
            let value = std::fs::read_to_string(file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read token_file {} for credential {}: {e}",
                    file.display(),
                    self.label
                ))
            })?;
            let value = value.trim().to_owned();
            if !value.is_empty() {
                return Ok(Secret::new(value));
            }
        }

        if let Some(ref token) = self.token
            && !token.trim().is_empty()
        {
            return Ok(Secret::new(token.trim().to_owned()));
        }

        Err(common::Error::Config(format!(
            "credential {} has no token (set token_env, token_file, or token)",
            self.label
        )))
    }
}
