//! Mining commands - mine blocks now or keep mining in the background

use super::ConfigSource;
use anyhow::{Context, Result};
use std::time::Duration;

use crate::ui;

pub async fn run(config: ConfigSource<'_>, count: i64, verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    let hashes = network
        .mine_blocks(count)
        .await
        .with_context(|| format!("Failed to mine {} blocks", count))?;

    ui::done(&format!("Mined {} blocks", hashes.len()));
    if verbose {
        ui::block_hashes(&hashes);
    }
    Ok(())
}

pub async fn auto(config: ConfigSource<'_>, interval_secs: u64, blocks: u64, _verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    network
        .start_auto_mining(Duration::from_secs(interval_secs), blocks)
        .await
        .context("Failed to start auto mining")?;
    ui::step(&format!(
        "Mining {} blocks whenever the mempool is not empty, checking every {}s. Press Ctrl-C to stop.",
        blocks, interval_secs
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    network
        .stop_auto_mining()
        .await
        .context("Failed to stop auto mining")?;
    ui::done("Auto mining stopped");
    Ok(())
}
