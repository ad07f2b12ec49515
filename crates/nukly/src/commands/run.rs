//! `nukly run`: the long-running platform.

use std::sync::Arc;

use nukly_core::{AccessoryHost, CoreError, PlatformConfig, SyncCoordinator};
use tracing::info;

use crate::error::CliError;
use crate::host::JournalHost;

pub async fn handle(platform: PlatformConfig) -> Result<(), CliError> {
    std::fs::create_dir_all(&platform.storage_path).map_err(|source| CoreError::Storage {
        path: platform.storage_path.display().to_string(),
        source,
    })?;

    let host: Arc<dyn AccessoryHost> = Arc::new(JournalHost::open(&platform.storage_path));
    let coordinator = SyncCoordinator::new(platform, host)?;
    coordinator.start().await?;
    info!(
        bridges = coordinator.registry().len(),
        devices = coordinator.store().len(),
        "nukly running; press Ctrl-C to stop"
    );

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    coordinator.shutdown().await;
    signal.map_err(CliError::from)
}
