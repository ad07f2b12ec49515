// ── Callback ingestion server ──
//
// Bridges push state changes as `POST /` with a JSON body. The listener
// routes each payload to the matching device and answers 200 whether or
// not a device matched, so a bridge never retries a payload we chose to
// drop.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use nukly_api::{BridgeClient, CallbackPayload};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CallbackServerConfig;
use crate::device::StateConsumer;
use crate::error::CoreError;
use crate::store::DeviceStore;

/// Upper bound on a callback body.
pub const MAX_BODY_BYTES: usize = 1_000_000;

/// The ingestion router.
pub fn router(store: Arc<DeviceStore>) -> Router {
    Router::new()
        .route("/", post(ingest))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(store)
}

/// `POST /`
async fn ingest(State(store): State<Arc<DeviceStore>>, body: Bytes) -> StatusCode {
    let payload: CallbackPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "discarding malformed callback");
            return StatusCode::BAD_REQUEST;
        }
    };

    match store.get(&payload.nuki_id) {
        Some(device) => {
            debug!(device_id = %payload.nuki_id, state = payload.state.state, "callback received");
            device.update(payload.state).await;
        }
        None => {
            warn!(device_id = %payload.nuki_id, "callback for unknown device");
        }
    }
    StatusCode::OK
}

/// Make sure every bridge pushes to `callback_url`.
///
/// Bridges that already list the URL are left alone. A failing bridge is
/// logged and skipped.
pub async fn ensure_callbacks(bridges: &[Arc<BridgeClient>], callback_url: &str) {
    for bridge in bridges {
        if let Err(e) = ensure_callback(bridge, callback_url).await {
            warn!(bridge = %bridge, error = %e, "cannot register callback");
        }
    }
}

async fn ensure_callback(bridge: &BridgeClient, callback_url: &str) -> Result<(), CoreError> {
    let existing = bridge.get_callbacks().await?;
    if existing.iter().any(|c| c.url == callback_url) {
        debug!(bridge = %bridge, callback_url, "callback already registered");
        return Ok(());
    }
    bridge.add_callback(callback_url).await?;
    info!(bridge = %bridge, callback_url, "callback registered");
    Ok(())
}

/// Bind, retrying on a fixed backoff until bound or cancelled.
///
/// Returns `None` if cancelled before a bind succeeded.
pub async fn bind(
    config: &CallbackServerConfig,
    cancel: &CancellationToken,
) -> Option<TcpListener> {
    let addr = format!("{}:{}", config.bind_host, config.port);
    loop {
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Some(listener),
            Err(source) => {
                let err = CoreError::Bind {
                    addr: addr.clone(),
                    source,
                };
                error!(error = %err, retry_in = ?config.bind_retry, "callback server bind failed");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(config.bind_retry) => {}
        }
    }
}

/// Serve callbacks until `cancel` fires.
pub async fn serve(
    config: CallbackServerConfig,
    store: Arc<DeviceStore>,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let Some(listener) = bind(&config, &cancel).await else {
        return Ok(());
    };
    let local = listener
        .local_addr()
        .map_or_else(|_| config.bind_host.clone(), |a| a.to_string());
    info!(addr = %local, callback_url = %config.callback_url(), "callback server listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|source| CoreError::Bind {
            addr: local,
            source,
        })
}
