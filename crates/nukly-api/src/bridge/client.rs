// Bridge HTTP client
//
// Wraps `reqwest::Client` with bridge URL construction, request signing,
// and success-envelope checking. One instance per bridge.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::bridge::models::{
    BridgeInfo, BridgeRecord, CallbackEntry, CallbackList, ListedDevice, SuccessResponse,
};
use crate::error::Error;
use crate::signer::{RequestSigner, SigningMode};
use crate::transport::TransportConfig;
use crate::types::{DeviceAction, DeviceId, DeviceType};

/// Typed client for one bridge's local HTTP API.
///
/// The bridge identifier is interior-mutable: `info()` refreshes it from
/// the response, since a statically configured or freshly discovered
/// bridge may report a different `serverId` than the caller assumed.
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    ip: String,
    port: u16,
    id: AtomicU64,
    signer: RequestSigner,
    timeout_secs: u64,
}

impl BridgeClient {
    /// Build a client from a persisted bridge record.
    pub fn new(record: &BridgeRecord, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{}:{}/", record.ip, record.port))?;
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            ip: record.ip.clone(),
            port: record.port,
            id: AtomicU64::new(record.id),
            signer: RequestSigner::new(
                record.token.clone(),
                SigningMode::from_hash_token(record.hash_token),
            ),
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// The bridge identifier (`serverId`), as last reported.
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn signing_mode(&self) -> SigningMode {
        self.signer.mode()
    }

    /// Snapshot this client back into its persisted form.
    pub fn record(&self) -> BridgeRecord {
        BridgeRecord {
            id: self.id(),
            ip: self.ip.clone(),
            port: self.port,
            token: self.signer.token().clone(),
            hash_token: self.signer.mode().is_hashed(),
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /info`. Updates the cached bridge identifier.
    pub async fn info(&self) -> Result<BridgeInfo, Error> {
        let info: BridgeInfo = self.get("info", &[]).await?;
        let previous = self.id.swap(info.ids.server_id, Ordering::AcqRel);
        if previous != info.ids.server_id {
            debug!(previous, current = info.ids.server_id, "bridge reported new identifier");
        }
        Ok(info)
    }

    /// `GET /list`: all paired devices with their last known state.
    pub async fn list(&self) -> Result<Vec<ListedDevice>, Error> {
        self.get("list", &[]).await
    }

    /// `GET /callback/list`
    pub async fn get_callbacks(&self) -> Result<Vec<CallbackEntry>, Error> {
        let list: CallbackList = self.get("callback/list", &[]).await?;
        Ok(list.callbacks)
    }

    /// `GET /callback/add?url=`
    pub async fn add_callback(&self, callback_url: &str) -> Result<(), Error> {
        debug!(bridge = %self, callback_url, "registering callback");
        self.get_action("callback/add", &[("url", callback_url)]).await
    }

    /// `GET /callback/remove?id=`
    pub async fn remove_callback(&self, callback_id: u32) -> Result<(), Error> {
        let id = callback_id.to_string();
        debug!(bridge = %self, callback_id, "removing callback");
        self.get_action("callback/remove", &[("id", &id)]).await
    }

    /// `GET /lockAction?nukiId=&deviceType=&action=&noWait=0`
    ///
    /// The action is not checked against the device type; callers own
    /// that contract.
    pub async fn lock_action(
        &self,
        device_id: &DeviceId,
        device_type: DeviceType,
        action: DeviceAction,
    ) -> Result<(), Error> {
        let device_type_code = device_type.code().to_string();
        let action_code = action.code().to_string();
        debug!(bridge = %self, %device_id, %action, "sending lock action");
        self.get_action(
            "lockAction",
            &[
                ("nukiId", device_id.as_str()),
                ("deviceType", &device_type_code),
                ("action", &action_code),
                ("noWait", "0"),
            ],
        )
        .await
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = self.signer.sign(&self.base_url, path, query)?;
        trace!(bridge = %self, path, "GET");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        parse_json(resp, self.timeout_secs).await
    }

    /// GET an endpoint whose body is `{ "success": bool }`.
    async fn get_action(&self, path: &str, query: &[(&str, &str)]) -> Result<(), Error> {
        let resp: SuccessResponse = self.get(path, query).await?;
        if resp.success {
            Ok(())
        } else {
            Err(Error::ActionFailed {
                message: resp
                    .message
                    .unwrap_or_else(|| format!("/{path} reported success=false")),
            })
        }
    }
}

impl fmt::Display for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={} ip={} port={}", self.id(), self.ip, self.port)
    }
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("id", &self.id())
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("mode", &self.signer.mode())
            .finish_non_exhaustive()
    }
}

/// Check status, then decode the JSON body.
///
/// 401/403 become [`Error::Authentication`]; other non-2xx statuses become
/// [`Error::Http`] with a short body preview.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    timeout_secs: u64,
) -> Result<T, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("token rejected (HTTP {status})"),
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }

    let body = resp
        .text()
        .await
        .map_err(|e| Error::from_send(e, timeout_secs))?;

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}
