//! Bridge management: discover, pair, list, unpair.

use nukly_api::{BridgeClient, DiscoveredBridge};
use nukly_core::{CoreError, PlatformConfig};
use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use crate::cli::{GlobalOpts, PairArgs, UnpairArgs};
use crate::commands::registry;
use crate::error::CliError;
use crate::output;

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "BRIDGE ID")]
    id: u64,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "LAST SEEN")]
    updated: String,
}

impl From<&DiscoveredBridge> for CandidateRow {
    fn from(b: &DiscoveredBridge) -> Self {
        Self {
            id: b.bridge_id,
            ip: b.ip.clone(),
            port: b.port,
            updated: b.date_updated.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

/// A stored bridge without its token.
#[derive(Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct StoredBridge {
    #[tabled(rename = "BRIDGE ID")]
    id: u64,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "HASHED")]
    hash_token: bool,
}

impl From<&BridgeClient> for StoredBridge {
    fn from(b: &BridgeClient) -> Self {
        Self {
            id: b.id(),
            ip: b.ip().to_owned(),
            port: b.port(),
            hash_token: b.signing_mode().is_hashed(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn discover(platform: &PlatformConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let candidates = registry(platform)?
        .discover()
        .await
        .map_err(|e| match e {
            CoreError::Transport { message } => CliError::ConnectionFailed {
                target: platform.discovery_url.clone(),
                message,
            },
            other => other.into(),
        })?;

    let out = output::render_list(&global.output, &candidates, |b| CandidateRow::from(b), |b| {
        b.bridge_id.to_string()
    });
    output::print_output(&out);
    Ok(())
}

pub async fn pair(platform: &PlatformConfig, args: PairArgs) -> Result<(), CliError> {
    warn_if_static(platform);
    let registry = registry(platform)?;
    registry.load().await?;

    let candidate = DiscoveredBridge {
        bridge_id: args.id,
        ip: args.ip,
        port: args.port,
        date_updated: None,
    };
    let record = registry.auth(&candidate).await.map_err(|e| match e {
        CoreError::Authentication { message } => CliError::PairingRefused {
            id: candidate.bridge_id,
            message,
        },
        CoreError::Transport { message } => CliError::ConnectionFailed {
            target: format!("{}:{}", candidate.ip, candidate.port),
            message,
        },
        other => other.into(),
    })?;

    let bridge = registry.persist(&record).await?;
    output::print_output(&format!("Paired bridge {bridge}"));
    Ok(())
}

pub async fn list(platform: &PlatformConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = registry(platform)?;
    registry.load().await?;

    let stored: Vec<StoredBridge> = registry
        .bridges()
        .iter()
        .map(|b| StoredBridge::from(b.as_ref()))
        .collect();
    let out = output::render_list(&global.output, &stored, StoredBridge::clone, |b| {
        b.id.to_string()
    });
    output::print_output(&out);
    Ok(())
}

pub async fn unpair(platform: &PlatformConfig, args: UnpairArgs) -> Result<(), CliError> {
    warn_if_static(platform);
    let registry = registry(platform)?;
    registry.load().await?;

    if !registry.delete(args.id).await? {
        return Err(CliError::BridgeNotFound { id: args.id });
    }
    output::print_output(&format!("Removed bridge {}", args.id));
    Ok(())
}

fn warn_if_static(platform: &PlatformConfig) {
    if platform.is_static() {
        warn!("bridges are configured statically; `nukly run` will overwrite the store");
    }
}
