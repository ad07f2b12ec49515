// Bridge discovery and pairing
//
// Discovery asks the vendor's public endpoint which bridges have reported
// in from this network. Pairing is the one unsigned bridge call: `/auth`
// succeeds only while the bridge's button is being held.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::bridge::client::parse_json;
use crate::bridge::models::BridgeRecord;
use crate::error::Error;
use crate::signer::SigningMode;
use crate::transport::TransportConfig;

/// Default discovery endpoint.
pub const DEFAULT_DISCOVERY_URL: &str = "https://api.nuki.io/discover/bridges";

/// The bridge holds `/auth` open for up to 30 s waiting for its button.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(35);

/// A bridge candidate returned by discovery. Not yet authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredBridge {
    pub bridge_id: u64,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub date_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    bridges: Vec<DiscoveredBridge>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    success: bool,
}

/// Discovery endpoint plus the pairing handshake.
pub struct DiscoveryClient {
    http: reqwest::Client,
    discovery_url: Url,
    timeout_secs: u64,
}

impl DiscoveryClient {
    pub fn new(discovery_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            discovery_url: Url::parse(discovery_url)?,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Query the discovery endpoint. No side effects.
    pub async fn discover(&self) -> Result<Vec<DiscoveredBridge>, Error> {
        debug!(url = %self.discovery_url, "querying bridge discovery");
        let resp = self
            .http
            .get(self.discovery_url.clone())
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let body: DiscoveryResponse = parse_json(resp, self.timeout_secs).await?;
        debug!(count = body.bridges.len(), "discovery returned candidates");
        Ok(body.bridges)
    }

    /// `GET http://ip:port/auth` against a candidate.
    ///
    /// Returns a record carrying the issued token and the requested signing
    /// mode; the caller decides whether to persist it.
    pub async fn auth(
        &self,
        candidate: &DiscoveredBridge,
        mode: SigningMode,
    ) -> Result<BridgeRecord, Error> {
        let url = Url::parse(&format!("http://{}:{}/auth", candidate.ip, candidate.port))?;
        debug!(bridge_id = candidate.bridge_id, ip = %candidate.ip, "requesting pairing token");

        let timeout = AUTH_TIMEOUT.max(Duration::from_secs(self.timeout_secs));
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_send(e, timeout.as_secs()))?;
        let body: AuthResponse = parse_json(resp, timeout.as_secs()).await?;

        match body.token {
            Some(token) if body.success && !token.is_empty() => {
                info!(bridge_id = candidate.bridge_id, "bridge paired");
                Ok(BridgeRecord {
                    id: candidate.bridge_id,
                    ip: candidate.ip.clone(),
                    port: candidate.port,
                    token: token.into(),
                    hash_token: mode.is_hashed(),
                })
            }
            _ => Err(Error::Authentication {
                message: format!(
                    "bridge {} refused pairing; press its button and retry within 30 seconds",
                    candidate.bridge_id
                ),
            }),
        }
    }
}
