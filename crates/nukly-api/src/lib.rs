// nukly-api: Async Rust client for the Nuki Bridge HTTP API
// (plus the few cloud calls the opener needs)

pub mod bridge;
pub mod discovery;
pub mod error;
pub mod signer;
pub mod transport;
pub mod types;
pub mod web;

pub use bridge::client::BridgeClient;
pub use bridge::models::{
    BridgeInfo, BridgeRecord, CallbackEntry, CallbackPayload, ListedDevice, RawDeviceState,
};
pub use discovery::{AUTH_TIMEOUT, DEFAULT_DISCOVERY_URL, DiscoveredBridge, DiscoveryClient};
pub use error::Error;
pub use signer::{RequestSigner, SigningMode};
pub use transport::TransportConfig;
pub use types::{
    DeviceAction, DeviceFamily, DeviceId, DeviceType, LockAction, OpenerAction, UnknownDeviceType,
};
pub use web::{DEFAULT_WEB_API_URL, OpenerAdvancedConfig, WebClient, web_id};
