//! sqlward.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::error::{Classify, ErrorKind};

/// Environment variable overriding `secrets.token_secret`.
pub const TOKEN_SECRET_ENV: &str = "SQLWARD_TOKEN_SECRET";
/// Environment variable overriding `secrets.cipher_key`.
pub const CIPHER_KEY_ENV: &str = "SQLWARD_CIPHER_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqlwardConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct SecretsConfig {
    /// HMAC secret for bearer tokens.
    #[serde(default)]
    pub token_secret: String,
    /// Key material for the cluster password cipher.
    #[serde(default)]
    pub cipher_key: String,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("token_secret", &"<redacted>")
            .field("cipher_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl(),
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Period of the users/edges/statistics group.
    #[serde(default = "default_fast_interval")]
    pub fast_interval_secs: u64,
    /// Period of the clusters/options/rules group.
    #[serde(default = "default_slow_interval")]
    pub slow_interval_secs: u64,
    /// Upper bound on a single store query during refresh.
    #[serde(default = "default_refresh_deadline")]
    pub deadline_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            fast_interval_secs: default_fast_interval(),
            slow_interval_secs: default_slow_interval(),
            deadline_secs: default_refresh_deadline(),
        }
    }
}

impl RefreshConfig {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_interval_secs)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.slow_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Per-statement limit; `0` disables the limit.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Where execution sentinels are written. Unset disables them.
    #[serde(default)]
    pub sentinel_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            statement_timeout_secs: default_statement_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            sentinel_dir: None,
        }
    }
}

impl ExecutionConfig {
    pub fn statement_timeout(&self) -> Option<Duration> {
        (self.statement_timeout_secs > 0).then(|| Duration::from_secs(self.statement_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Local control socket of a running `serve`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_socket")]
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_control_socket(),
        }
    }
}

fn default_control_socket() -> PathBuf {
    PathBuf::from("/run/sqlward/sqlwardd.sock")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/sqlward/sqlward.redb")
}

fn default_token_ttl() -> u64 {
    8 * 60 * 60
}

fn default_fast_interval() -> u64 {
    10
}

fn default_slow_interval() -> u64 {
    60
}

fn default_refresh_deadline() -> u64 {
    5
}

fn default_statement_timeout() -> u64 {
    600
}

fn default_connect_timeout() -> u64 {
    10
}

impl SqlwardConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(TOKEN_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.secrets.token_secret = secret;
        }
        if let Some(key) = lookup(CIPHER_KEY_ENV).filter(|s| !s.is_empty()) {
            self.secrets.cipher_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secrets.token_secret.is_empty() {
            return Err(ConfigError::Invalid("secrets.token_secret is empty".into()));
        }
        if self.secrets.cipher_key.is_empty() {
            return Err(ConfigError::Invalid("secrets.cipher_key is empty".into()));
        }
        if self.token.ttl_secs == 0 {
            return Err(ConfigError::Invalid("token.ttl_secs must be positive".into()));
        }
        if self.refresh.fast_interval_secs == 0 || self.refresh.slow_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh intervals must be positive".into(),
            ));
        }
        if self.refresh.deadline_secs == 0 {
            return Err(ConfigError::Invalid("refresh.deadline_secs must be positive".into()));
        }
        Ok(())
    }
}
