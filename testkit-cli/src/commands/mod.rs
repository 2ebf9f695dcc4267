//! CLI command implementations

pub mod invoice;
pub mod mine;
pub mod pay;
pub mod scenario;
pub mod warm_up;

use anyhow::{Context, Result};
use lnpbp_testkit::{Network, NetworkConfig};
use std::path::Path;

/// Where the network configuration comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigSource<'a> {
    /// TOML or JSON file
    File(&'a Path),
    /// `TESTKIT_*` environment variables
    Env,
    /// System regtest packages under `/etc`
    System,
}

/// Load the network configuration from `source`.
pub fn load_config(source: ConfigSource<'_>) -> Result<NetworkConfig> {
    match source {
        ConfigSource::File(path) => NetworkConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        ConfigSource::Env => NetworkConfig::from_env()
            .context("Failed to load config from TESTKIT_* environment variables"),
        ConfigSource::System => NetworkConfig::from_system()
            .context("Failed to load config of the system regtest network"),
    }
}

/// Connect to the network described by the configuration.
pub fn connect(source: ConfigSource<'_>) -> Result<Network> {
    tracing::debug!(?source, "Connecting to the network");
    let config = load_config(source)?;
    Network::from_config(&config).context("Failed to set up the network")
}
