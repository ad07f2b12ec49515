// Vendor cloud client
//
// Only the opener advanced-configuration calls are implemented. Devices
// are addressed by a web identifier derived from the local `nukiId`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::bridge::client::parse_json;
use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{DeviceId, DeviceType};

/// Default cloud API base.
pub const DEFAULT_WEB_API_URL: &str = "https://api.nuki.io/";

/// Suppression bit that silences the opener's ring sound.
pub const RING_SUPPRESSION_BIT: u8 = 4;

/// Derive the cloud identifier of a device.
///
/// Hex-encode the numeric id, drop one leading `0` if present, prefix the
/// decimal device-type code, and read the result back as hex.
pub fn web_id(device_id: &DeviceId, device_type: DeviceType) -> Result<u64, Error> {
    let numeric: u64 = device_id
        .as_str()
        .parse()
        .map_err(|_| Error::InvalidIdentifier(device_id.to_string()))?;

    let hex = format!("{numeric:x}");
    let hex = hex.strip_prefix('0').unwrap_or(&hex);
    let combined = format!("{}{hex}", device_type.code());

    u64::from_str_radix(&combined, 16).map_err(|_| Error::InvalidIdentifier(device_id.to_string()))
}

/// `openerAdvancedConfig`. Unmodelled fields are carried through unchanged
/// so a read-modify-write round trip does not clobber them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenerAdvancedConfig {
    #[serde(default)]
    pub doorbell_suppression: u8,
    #[serde(default)]
    pub sound_level: u8,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OpenerAdvancedConfig {
    pub fn ring_muted(&self) -> bool {
        self.doorbell_suppression & RING_SUPPRESSION_BIT != 0
    }

    pub fn set_ring_muted(&mut self, muted: bool) {
        if muted {
            self.doorbell_suppression |= RING_SUPPRESSION_BIT;
        } else {
            self.doorbell_suppression &= !RING_SUPPRESSION_BIT;
        }
    }
}

/// `GET /smartlock/{webId}`. Only the opener config block is typed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDevice {
    #[serde(default)]
    pub smartlock_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub opener_advanced_config: Option<OpenerAdvancedConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Bearer-authenticated client for the cloud API.
pub struct WebClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl WebClient {
    pub fn new(
        base_url: &str,
        api_token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_token.expose_secret()))
                .map_err(|_| Error::Authentication {
                    message: "web API token contains invalid header characters".into(),
                })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: transport.build_client_with_headers(headers)?,
            base_url,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// `GET /smartlock/{webId}`
    pub async fn get_device_config(
        &self,
        device_id: &DeviceId,
        device_type: DeviceType,
    ) -> Result<WebDevice, Error> {
        let url = self.device_url(device_id, device_type, "")?;
        debug!(%device_id, "fetching cloud device config");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;
        parse_json(resp, self.timeout_secs).await
    }

    /// The opener's advanced config, or a default block if the cloud
    /// returned none.
    pub async fn opener_advanced_config(
        &self,
        device_id: &DeviceId,
    ) -> Result<OpenerAdvancedConfig, Error> {
        let device = self.get_device_config(device_id, DeviceType::Opener).await?;
        Ok(device.opener_advanced_config.unwrap_or_default())
    }

    /// `POST /smartlock/{webId}/advanced/openerconfig`
    pub async fn update_opener_advanced_config(
        &self,
        device_id: &DeviceId,
        config: &OpenerAdvancedConfig,
    ) -> Result<(), Error> {
        let url = self.device_url(device_id, DeviceType::Opener, "/advanced/openerconfig")?;
        debug!(%device_id, "updating opener advanced config");
        let resp = self
            .http
            .post(url)
            .json(config)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("web API token rejected (HTTP {status})"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Ok(())
    }

    fn device_url(
        &self,
        device_id: &DeviceId,
        device_type: DeviceType,
        suffix: &str,
    ) -> Result<Url, Error> {
        let id = web_id(device_id, device_type)?;
        Ok(self.base_url.join(&format!("smartlock/{id}{suffix}"))?)
    }
}
