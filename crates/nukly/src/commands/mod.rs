//! Command dispatch.

pub mod bridges;
pub mod run;

use nukly_api::SigningMode;
use nukly_core::{BridgeRegistry, PlatformConfig};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(
    cmd: Command,
    platform: PlatformConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(platform).await,
        Command::Discover => bridges::discover(&platform, global).await,
        Command::Pair(args) => bridges::pair(&platform, args).await,
        Command::Bridges => bridges::list(&platform, global).await,
        Command::Unpair(args) => bridges::unpair(&platform, args).await,
    }
}

/// A registry over the configured store, without loading it.
pub(crate) fn registry(platform: &PlatformConfig) -> Result<BridgeRegistry, CliError> {
    Ok(BridgeRegistry::new(
        platform.bridge_store_path(),
        platform.transport.clone(),
        &platform.discovery_url,
        SigningMode::from_hash_token(platform.hash_token),
    )?)
}
