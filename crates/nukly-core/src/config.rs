// ── Runtime platform configuration ──
//
// These types describe how the coordinator runs: where it persists
// bridges, how it reaches them, and per-device feature toggles. They
// never touch disk; `nukly-config` builds a `PlatformConfig` and hands
// it in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use nukly_api::{BridgeRecord, DeviceId, TransportConfig};
use secrecy::SecretString;

/// Registry store file name inside `storage_path`.
pub const BRIDGE_STORE_FILE: &str = "nuki-bridges.json";

/// How the callback listener binds and how bridges reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackServerConfig {
    /// Address announced to bridges.
    pub ip: String,
    pub port: u16,
    /// Address the listener binds to.
    pub bind_host: String,
    pub bind_retry: Duration,
}

impl CallbackServerConfig {
    /// The externally reachable URL registered with every bridge.
    pub fn callback_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".into(),
            port: 8890,
            bind_host: "0.0.0.0".into(),
            bind_retry: Duration::from_secs(1),
        }
    }
}

/// Lock-family toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartLockConfig {
    /// Allow unlatching while the bolt is thrown.
    pub unlatch_when_locked: bool,
    /// Expose the lock-mechanism pair.
    pub secure_lock_service: bool,
    /// Expose the plain on/off switch.
    pub unsecure_lock_service: bool,
}

impl Default for SmartLockConfig {
    fn default() -> Self {
        Self {
            unlatch_when_locked: false,
            secure_lock_service: true,
            unsecure_lock_service: false,
        }
    }
}

/// Opener-family toggles.
#[derive(Debug, Clone, Default)]
pub struct OpenerConfig {
    pub rto_switch_service: bool,
    pub continuous_mode_switch_service: bool,
    pub doorbell_service: bool,
    pub doorbell_mute_service: bool,
    /// Cloud API token; required for doorbell mute and sound level.
    pub web_api_token: Option<SecretString>,
    /// Disarm ring-to-open this long after the first ring.
    pub deactivate_rto_after_first_ring_timeout: Option<Duration>,
}

/// Everything the coordinator needs to run.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Directory holding the registry store.
    pub storage_path: PathBuf,
    /// Sign requests with the rotating hash instead of the plain token.
    pub hash_token: bool,
    pub transport: TransportConfig,
    /// Full resync period. `None` disables periodic resync.
    pub resync_interval: Option<Duration>,
    pub discovery_url: String,
    pub web_api_url: String,
    pub callback_server: CallbackServerConfig,
    /// Non-empty switches the registry to static mode.
    pub bridges: Vec<BridgeRecord>,
    pub smart_locks: HashMap<DeviceId, SmartLockConfig>,
    pub openers: HashMap<DeviceId, OpenerConfig>,
}

impl PlatformConfig {
    pub fn bridge_store_path(&self) -> PathBuf {
        self.storage_path.join(BRIDGE_STORE_FILE)
    }

    pub fn is_static(&self) -> bool {
        !self.bridges.is_empty()
    }

    pub fn smart_lock(&self, id: &DeviceId) -> SmartLockConfig {
        self.smart_locks.get(id).copied().unwrap_or_default()
    }

    pub fn opener(&self, id: &DeviceId) -> OpenerConfig {
        self.openers.get(id).cloned().unwrap_or_default()
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("."),
            hash_token: true,
            transport: TransportConfig::default(),
            resync_interval: Some(Duration::from_secs(600)),
            discovery_url: nukly_api::DEFAULT_DISCOVERY_URL.into(),
            web_api_url: nukly_api::DEFAULT_WEB_API_URL.into(),
            callback_server: CallbackServerConfig::default(),
            bridges: Vec::new(),
            smart_locks: HashMap::new(),
            openers: HashMap::new(),
        }
    }
}
