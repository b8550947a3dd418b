//! Configuration: optional TOML file, then environment overlay, then validation.
//!
//! File lookup is `--config <path>` or `$XDG_CONFIG_HOME/raftsnap/config.toml`.
//! The default file is optional and never created. Environment variables use
//! the operator's historical names (`VAULT_ADDR`, `AZURE_STORAGE_SAS`, ...)
//! and override file values when set to a non-empty string. A `.env` file in
//! the working directory supplies variables the process does not set.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{AuthMethod, DEFAULT_K8S_JWT_PATH, DEFAULT_K8S_MOUNT};
use crate::http::TlsSettings;
use crate::provider::azure::{self, AzureConfig};
use crate::provider::ProviderConfig;
use crate::raft::{ClusterSettings, DEFAULT_CLUSTER_ADDR};
use crate::retry::RetryPolicy;
use crate::secret::Secret;

pub const DEFAULT_BACKUP_LOCAL: &str = "./snapshot.snap";
pub const DEFAULT_BACKUP_PREFIX: &str = "vault/snapshots";
/// strftime layout for the remote file name, e.g. `2025-09-08T15-42-01Z`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";
pub const DEFAULT_RESTORE_LOCAL: &str = "./restored.snap";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("locate config directory: {0}")]
    Xdg(String),
    #[error("read {}: {message}", .path.display())]
    Dotenv { path: PathBuf, message: String },
    #[error("no auth method configured: set VAULT_AUTH_METHOD=token with VAULT_TOKEN, or provide a readable VAULT_K8S_JWT_PATH for kubernetes")]
    NoAuthMethod,
    #[error("unsupported auth method: {0}")]
    UnsupportedAuthMethod(String),
    #[error("auth method token requires VAULT_TOKEN")]
    MissingToken,
    #[error("auth method kubernetes requires VAULT_K8S_ROLE")]
    MissingRole,
    #[error("auth method kubernetes requires a readable VAULT_K8S_JWT_PATH ({})", .0.display())]
    UnreadableJwt(PathBuf),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("azure: AZURE_STORAGE_ACCOUNT and AZURE_STORAGE_CONTAINER are required")]
    AzureIncomplete,
}

/// Cluster connection and authentication (`[vault]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub address: String,
    /// `token` or `kubernetes`; inferred when unset.
    pub auth_method: Option<String>,
    pub token: Secret,
    pub auth_mount: String,
    pub k8s_role: String,
    pub k8s_jwt_path: PathBuf,
    pub k8s_audience: Option<String>,
    pub namespace: Option<String>,
    pub ca_cert: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub skip_verify: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_CLUSTER_ADDR.to_string(),
            auth_method: None,
            token: Secret::default(),
            auth_mount: DEFAULT_K8S_MOUNT.to_string(),
            k8s_role: String::new(),
            k8s_jwt_path: PathBuf::from(DEFAULT_K8S_JWT_PATH),
            k8s_audience: None,
            namespace: None,
            ca_cert: None,
            ca_path: None,
            skip_verify: false,
        }
    }
}

/// `[backup]`: local snapshot file and remote naming.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub source: PathBuf,
    pub target_prefix: String,
    pub timestamp_format: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from(DEFAULT_BACKUP_LOCAL),
            target_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// `[restore]`: remote key to fetch and where to put it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub source: String,
    pub target: PathBuf,
    pub force: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: PathBuf::from(DEFAULT_RESTORE_LOCAL),
            force: false,
        }
    }
}

/// `[retry]`: durations are strings such as `"300ms"` or `"8s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(deserialize_with = "de_duration")]
    pub initial_delay: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            max_attempts: p.max_attempts,
            initial_delay: p.initial_delay,
            max_delay: p.max_delay,
            multiplier: p.multiplier,
            jitter: p.jitter,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage provider name (`azure`).
    pub provider: String,
    pub vault: VaultConfig,
    pub backup: BackupConfig,
    pub restore: RestoreConfig,
    pub retry: RetryConfig,
    pub azure: AzureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: azure::PROVIDER_NAME.to_string(),
            vault: VaultConfig::default(),
            backup: BackupConfig::default(),
            restore: RestoreConfig::default(),
            retry: RetryConfig::default(),
            azure: AzureConfig::default(),
        }
    }
}

/// Default config file location, if one exists. Never creates anything.
pub fn default_config_path() -> Result<Option<PathBuf>, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("raftsnap").map_err(|e| ConfigError::Xdg(e.to_string()))?;
    Ok(xdg_dirs.find_config_file("config.toml"))
}

/// `.env` file read from the working directory when present.
pub const DOTENV_FILE: &str = ".env";

/// Process environment over an optional `.env` file. A variable the process
/// already sets, even to an empty string, is never taken from the file.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    dotenv: HashMap<String, String>,
}

impl Environment {
    /// Process environment plus [`DOTENV_FILE`], if it exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::with_dotenv(Path::new(DOTENV_FILE))
    }

    /// A missing file is not an error; a malformed one is.
    pub fn with_dotenv(path: &Path) -> Result<Self, ConfigError> {
        let dotenv_error = |e: dotenvy::Error| ConfigError::Dotenv {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Ok(Self::default()),
            Err(e) => return Err(dotenv_error(e)),
        };
        let dotenv = iter.collect::<Result<HashMap<_, _>, _>>().map_err(dotenv_error)?;
        Ok(Self { dotenv })
    }

    /// Number of variables the `.env` file defined.
    pub fn dotenv_len(&self) -> usize {
        self.dotenv.len()
    }

    pub fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().or_else(|| self.dotenv.get(key).cloned())
    }
}

/// Load the file (explicit path must exist; default path is optional) and
/// overlay `env`.
pub fn load(explicit: Option<&Path>, env: &Environment) -> Result<Config, ConfigError> {
    let mut cfg = match explicit {
        Some(path) => Config::from_file(path)?,
        None => match default_config_path()? {
            Some(path) => Config::from_file(&path)?,
            None => Config::default(),
        },
    };
    cfg.apply_env(|key| env.var(key));
    Ok(cfg)
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(cfg)
    }

    /// Overlay values from `lookup` (the environment in production). Blank
    /// values are ignored; unparseable numbers keep the previous value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("VAULT_ADDR") {
            self.vault.address = v;
        }
        if let Some(v) = get("VAULT_AUTH_METHOD") {
            self.vault.auth_method = Some(v.to_ascii_lowercase());
        }
        if let Some(v) = get("VAULT_TOKEN") {
            self.vault.token = Secret::new(v);
        }
        if let Some(v) = get("VAULT_AUTH_MOUNT") {
            self.vault.auth_mount = v;
        }
        if let Some(v) = get("VAULT_K8S_ROLE") {
            self.vault.k8s_role = v;
        }
        if let Some(v) = get("VAULT_K8S_JWT_PATH") {
            self.vault.k8s_jwt_path = PathBuf::from(v);
        }
        if let Some(v) = get("VAULT_K8S_AUDIENCE") {
            self.vault.k8s_audience = Some(v);
        }
        if let Some(v) = get("VAULT_NAMESPACE") {
            self.vault.namespace = Some(v);
        }
        if let Some(v) = get("VAULT_CACERT") {
            self.vault.ca_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = get("VAULT_CAPATH") {
            self.vault.ca_path = Some(PathBuf::from(v));
        }
        if let Some(b) = get("VAULT_SKIP_VERIFY").and_then(|v| parse_bool(&v)) {
            self.vault.skip_verify = b;
        }

        if let Some(v) = get("BACKUP_PROVIDER") {
            self.provider = v.to_ascii_lowercase();
        }
        if let Some(v) = get("BACKUP_SOURCE") {
            self.backup.source = PathBuf::from(v);
        }
        if let Some(v) = get("BACKUP_TARGET") {
            self.backup.target_prefix = v;
        }
        if let Some(v) = get("BACKUP_TIMESTAMP_FORMAT") {
            self.backup.timestamp_format = v;
        }
        if let Some(v) = get("RESTORE_SOURCE") {
            self.restore.source = v;
        }
        if let Some(v) = get("RESTORE_TARGET") {
            self.restore.target = PathBuf::from(v);
        }
        if let Some(b) = get("VAULT_SNAPSHOT_FORCE").and_then(|v| parse_bool(&v)) {
            self.restore.force = b;
        }

        if let Some(v) = get("AZURE_STORAGE_ACCOUNT") {
            self.azure.account = v;
        }
        if let Some(v) = get("AZURE_STORAGE_CONTAINER") {
            self.azure.container = v;
        }
        if let Some(v) = get("AZURE_STORAGE_SAS") {
            self.azure.sas_token = Secret::new(v);
        }
        if let Some(v) = get("AZURE_CLIENT_ID") {
            self.azure.client_id = v;
        }
        if let Some(v) = get("AZURE_CLIENT_SECRET") {
            self.azure.client_secret = Secret::new(v);
        }
        if let Some(v) = get("AZURE_TENANT_ID") {
            self.azure.tenant_id = v;
        }
        if let Some(v) = get("AZURE_BLOB_ENDPOINT") {
            self.azure.endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_AUTHORITY_HOST") {
            self.azure.authority_host = Some(v);
        }
        if let Some(v) = get("AZURE_FEDERATED_TOKEN_FILE") {
            self.azure.federated_token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("AZURE_IMDS_ENDPOINT") {
            self.azure.imds_endpoint = Some(v);
        }

        if let Some(n) = get("RETRY_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            self.retry.max_attempts = n;
        }
        if let Some(d) = get("RETRY_INITIAL_DELAY").and_then(|v| parse_duration(&v)) {
            self.retry.initial_delay = d;
        }
        if let Some(d) = get("RETRY_MAX_DELAY").and_then(|v| parse_duration(&v)) {
            self.retry.max_delay = d;
        }
        if let Some(m) = get("RETRY_MULTIPLIER")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|m| m.is_finite() && *m > 0.0)
        {
            self.retry.multiplier = m;
        }
        if let Some(b) = get("RETRY_JITTER").and_then(|v| parse_bool(&v)) {
            self.retry.jitter = b;
        }
    }

    /// Resolve the auth method: explicit name, else `token` when a token is
    /// set, else `kubernetes` when the JWT file is readable.
    pub fn auth_method(&self) -> Result<AuthMethod, ConfigError> {
        let v = &self.vault;
        let method = match v.auth_method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_ascii_lowercase(),
            None if !v.token.is_empty() => "token".to_string(),
            None if readable(&v.k8s_jwt_path) => "kubernetes".to_string(),
            None => return Err(ConfigError::NoAuthMethod),
        };
        match method.as_str() {
            "token" => {
                if v.token.is_empty() {
                    return Err(ConfigError::MissingToken);
                }
                Ok(AuthMethod::Token(v.token.clone()))
            }
            "kubernetes" => {
                let role = v.k8s_role.trim();
                if role.is_empty() {
                    return Err(ConfigError::MissingRole);
                }
                if !readable(&v.k8s_jwt_path) {
                    return Err(ConfigError::UnreadableJwt(v.k8s_jwt_path.clone()));
                }
                let mount = match v.auth_mount.trim() {
                    "" => DEFAULT_K8S_MOUNT.to_string(),
                    m => m.to_string(),
                };
                Ok(AuthMethod::Kubernetes {
                    role: role.to_string(),
                    jwt_path: v.k8s_jwt_path.clone(),
                    mount,
                    audience: v.k8s_audience.clone().filter(|a| !a.trim().is_empty()),
                })
            }
            other => Err(ConfigError::UnsupportedAuthMethod(other.to_string())),
        }
    }

    /// Tagged provider configuration for the selected provider name.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        match self.provider.trim().to_ascii_lowercase().as_str() {
            azure::PROVIDER_NAME => {
                if self.azure.account.trim().is_empty() || self.azure.container.trim().is_empty() {
                    return Err(ConfigError::AzureIncomplete);
                }
                Ok(ProviderConfig::Azure(self.azure.clone()))
            }
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: self.retry.initial_delay,
            max_delay: self.retry.max_delay,
            multiplier: self.retry.multiplier,
            jitter: self.retry.jitter,
        }
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            namespace: self.vault.namespace.clone().filter(|n| !n.trim().is_empty()),
            tls: TlsSettings {
                ca_cert: self.vault.ca_cert.clone(),
                ca_path: self.vault.ca_path.clone(),
                skip_verify: self.vault.skip_verify,
            },
            ..ClusterSettings::default()
        }
    }
}

fn readable(path: &Path) -> bool {
    !path.as_os_str().is_empty() && fs::File::open(path).is_ok()
}

/// `1|true|yes|y|on` or `0|false|no|n|off`, case-insensitive.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Durations like `300ms`, `8s`, `1m30s`, `1.5h`. Units: ns, us, µs, ms, s, m, h.
/// A bare `0` is zero.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }
    let mut total_ns = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let ns_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_ns += value * ns_per_unit;
    }
    if !total_ns.is_finite() || total_ns >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_ns.round() as u64))
}

fn de_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    parse_duration(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid duration {:?}", s)))
}
