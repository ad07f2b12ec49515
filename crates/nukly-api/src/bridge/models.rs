// Bridge API response types
//
// Field names follow the bridge's camelCase JSON. Everything optional on
// the wire is `Option` or `#[serde(default)]` here; firmware versions
// differ in what they include.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::DeviceId;

/// A device state snapshot, exactly as the bridge reports it.
///
/// Shared by `/list` (`lastKnownState`) and callback payloads. The
/// `state` code is interpreted per device family by the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDeviceState {
    pub mode: u8,
    pub state: u8,
    pub state_name: Option<String>,
    pub battery_critical: bool,
    pub doorsensor_state: u8,
    pub doorsensor_state_name: Option<String>,
    pub ringaction_state: bool,
    pub ringaction_timestamp: Option<String>,
}

/// One entry of `GET /list`.
///
/// `device_type` stays numeric: an unknown code should fail that one
/// device, not the whole listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedDevice {
    pub nuki_id: DeviceId,
    pub device_type: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub last_known_state: Option<RawDeviceState>,
}

/// A push notification body (`POST` from the bridge to our callback URL).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub nuki_id: DeviceId,
    #[serde(default)]
    pub device_type: Option<u8>,
    #[serde(flatten)]
    pub state: RawDeviceState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeIds {
    #[serde(default)]
    pub hardware_id: Option<u64>,
    pub server_id: u64,
}

/// `GET /info`. Only the identifiers are relied on; the rest is kept
/// loosely typed because it varies by firmware.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeInfo {
    #[serde(default)]
    pub bridge_type: Option<u8>,
    pub ids: BridgeIds,
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default)]
    pub server_connected: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One subscription from `GET /callback/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackEntry {
    pub id: u32,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackList {
    #[serde(default)]
    pub callbacks: Vec<CallbackEntry>,
}

/// Envelope of every mutating endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A bridge as persisted: `{id, ip, port, token, hashToken}`.
///
/// The token serializes in clear text because this is the durable store;
/// `Debug` redacts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRecord {
    pub id: u64,
    pub ip: String,
    pub port: u16,
    #[serde(serialize_with = "expose_token", deserialize_with = "read_token")]
    pub token: SecretString,
    #[serde(default)]
    pub hash_token: bool,
}

fn expose_token<S: Serializer>(token: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(token.expose_secret())
}

fn read_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}
