//! Configuration for the nukly binary.
//!
//! A TOML file merged with `NUKLY_`-prefixed environment variables, and
//! its translation to `nukly_core::PlatformConfig`. Nested keys use a
//! double underscore in the environment: `NUKLY_CALLBACK_SERVER__PORT`.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use nukly_api::{BridgeRecord, DeviceId, TransportConfig};
use nukly_core::{CallbackServerConfig, OpenerConfig, PlatformConfig, SmartLockConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Directory for the bridge store and accessory journal. Defaults to
    /// the platform data directory.
    pub storage_path: Option<PathBuf>,

    /// Sign bridge requests with the rotating hash.
    #[serde(default = "default_true")]
    pub hash_token: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Full resync period; `0` disables it.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    #[serde(default = "default_web_api_url")]
    pub web_api_url: String,

    #[serde(default)]
    pub callback_server: CallbackServerSection,

    /// Configured bridges. Any entry here disables discovery.
    #[serde(default)]
    pub bridges: Vec<BridgeSection>,

    #[serde(default)]
    pub smart_locks: Vec<SmartLockSection>,

    #[serde(default)]
    pub openers: Vec<OpenerSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: None,
            hash_token: true,
            request_timeout_secs: default_request_timeout(),
            resync_interval_secs: default_resync_interval(),
            discovery_url: default_discovery_url(),
            web_api_url: default_web_api_url(),
            callback_server: CallbackServerSection::default(),
            bridges: Vec::new(),
            smart_locks: Vec::new(),
            openers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackServerSection {
    /// Address announced to bridges. Detected when unset.
    pub ip: Option<String>,

    #[serde(default = "default_callback_port")]
    pub port: u16,

    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_bind_retry")]
    pub bind_retry_ms: u64,
}

impl Default for CallbackServerSection {
    fn default() -> Self {
        Self {
            ip: None,
            port: default_callback_port(),
            bind_host: default_bind_host(),
            bind_retry_ms: default_bind_retry(),
        }
    }
}

/// A statically configured bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSection {
    pub id: u64,
    pub ip: String,
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// API token (plaintext; prefer `token_env`).
    pub token: Option<String>,
    /// Environment variable holding the API token.
    pub token_env: Option<String>,
    /// Overrides the top-level `hash_token`.
    pub hash_token: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmartLockSection {
    pub id: DeviceId,
    #[serde(default)]
    pub unlatch_when_locked: bool,
    #[serde(default = "default_true")]
    pub secure_lock_service: bool,
    #[serde(default)]
    pub unsecure_lock_service: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenerSection {
    pub id: DeviceId,
    #[serde(default)]
    pub rto_switch_service: bool,
    #[serde(default)]
    pub continuous_mode_switch_service: bool,
    #[serde(default)]
    pub doorbell_service: bool,
    #[serde(default)]
    pub doorbell_mute_service: bool,
    /// Cloud API token (plaintext; prefer `web_api_token_env`).
    pub web_api_token: Option<String>,
    pub web_api_token_env: Option<String>,
    pub deactivate_rto_after_first_ring_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    10
}
fn default_resync_interval() -> u64 {
    600
}
fn default_discovery_url() -> String {
    nukly_api::DEFAULT_DISCOVERY_URL.into()
}
fn default_web_api_url() -> String {
    nukly_api::DEFAULT_WEB_API_URL.into()
}
fn default_callback_port() -> u16 {
    8890
}
fn default_bind_host() -> String {
    "0.0.0.0".into()
}
fn default_bind_retry() -> u64 {
    1000
}
fn default_bridge_port() -> u16 {
    8080
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "nukly", "nukly")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "nukly", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default storage directory when `storage_path` is unset.
pub fn default_storage_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "nukly"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Config loading ──────────────────────────────────────────────────

fn base() -> Figment {
    Figment::new().merge(Serialized::defaults(Config::default()))
}

/// Load from `path` (or the default path) plus the environment. A
/// missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), "loading configuration");

    let config = base()
        .merge(Toml::file(&path))
        .merge(Env::prefixed("NUKLY_").split("__"))
        .extract()?;
    Ok(config)
}

/// Parse configuration from a TOML string, without the environment.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    Ok(base().merge(Toml::string(toml)).extract()?)
}

// ── Credential resolution ───────────────────────────────────────────

/// `*_env` variable first, then the plaintext value.
fn resolve_secret(plain: Option<&str>, env_name: Option<&str>) -> Option<SecretString> {
    env_name
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| plain.map(str::to_owned))
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and build the runtime configuration.
    pub fn to_platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        for (field, value) in [
            ("discovery_url", &self.discovery_url),
            ("web_api_url", &self.web_api_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::validation(field, format!("{value}: {e}")))?;
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "request_timeout_secs",
                "must be greater than zero",
            ));
        }

        Ok(PlatformConfig {
            storage_path: self
                .storage_path
                .clone()
                .unwrap_or_else(default_storage_path),
            hash_token: self.hash_token,
            transport: TransportConfig::with_timeout(Duration::from_secs(
                self.request_timeout_secs,
            )),
            resync_interval: (self.resync_interval_secs > 0)
                .then(|| Duration::from_secs(self.resync_interval_secs)),
            discovery_url: self.discovery_url.clone(),
            web_api_url: self.web_api_url.clone(),
            callback_server: self.callback_server(),
            bridges: self.bridge_records()?,
            smart_locks: self.smart_locks()?,
            openers: self.openers()?,
        })
    }

    fn callback_server(&self) -> CallbackServerConfig {
        let section = &self.callback_server;
        CallbackServerConfig {
            ip: section.ip.clone().unwrap_or_else(local_ipv4),
            port: section.port,
            bind_host: section.bind_host.clone(),
            bind_retry: Duration::from_millis(section.bind_retry_ms),
        }
    }

    fn bridge_records(&self) -> Result<Vec<BridgeRecord>, ConfigError> {
        let mut seen = Vec::with_capacity(self.bridges.len());
        self.bridges
            .iter()
            .map(|b| {
                let field = format!("bridges[id={}]", b.id);
                if seen.contains(&b.id) {
                    return Err(ConfigError::validation(field, "duplicate bridge id"));
                }
                seen.push(b.id);
                if b.ip.is_empty() || b.port == 0 {
                    return Err(ConfigError::validation(field, "ip and port are required"));
                }
                let token = resolve_secret(b.token.as_deref(), b.token_env.as_deref())
                    .ok_or_else(|| ConfigError::validation(field, "no token configured"))?;
                Ok(BridgeRecord {
                    id: b.id,
                    ip: b.ip.clone(),
                    port: b.port,
                    token,
                    hash_token: b.hash_token.unwrap_or(self.hash_token),
                })
            })
            .collect()
    }

    fn smart_locks(&self) -> Result<HashMap<DeviceId, SmartLockConfig>, ConfigError> {
        let mut out = HashMap::new();
        for lock in &self.smart_locks {
            let cfg = SmartLockConfig {
                unlatch_when_locked: lock.unlatch_when_locked,
                secure_lock_service: lock.secure_lock_service,
                unsecure_lock_service: lock.unsecure_lock_service,
            };
            if out.insert(lock.id.clone(), cfg).is_some() {
                return Err(ConfigError::validation(
                    format!("smart_locks[id={}]", lock.id),
                    "duplicate device id",
                ));
            }
        }
        Ok(out)
    }

    fn openers(&self) -> Result<HashMap<DeviceId, OpenerConfig>, ConfigError> {
        let mut out = HashMap::new();
        for opener in &self.openers {
            let cfg = OpenerConfig {
                rto_switch_service: opener.rto_switch_service,
                continuous_mode_switch_service: opener.continuous_mode_switch_service,
                doorbell_service: opener.doorbell_service,
                doorbell_mute_service: opener.doorbell_mute_service,
                web_api_token: resolve_secret(
                    opener.web_api_token.as_deref(),
                    opener.web_api_token_env.as_deref(),
                ),
                deactivate_rto_after_first_ring_timeout: opener
                    .deactivate_rto_after_first_ring_timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            };
            if out.insert(opener.id.clone(), cfg).is_some() {
                return Err(ConfigError::validation(
                    format!("openers[id={}]", opener.id),
                    "duplicate device id",
                ));
            }
        }
        Ok(out)
    }
}

/// The local IPv4 address used for outbound traffic, or loopback.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn local_ipv4() -> String {
    let probe = || -> std::io::Result<SocketAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        socket.local_addr()
    };
    match probe() {
        Ok(SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => addr.ip().to_string(),
        _ => Ipv4Addr::LOCALHOST.to_string(),
    }
}
