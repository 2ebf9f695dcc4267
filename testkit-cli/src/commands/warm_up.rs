//! Warm-up command - prepare coins, the secondary node and channels

use super::ConfigSource;
use anyhow::{Context, Result};
use lnpbp_testkit::WarmUp;

use crate::ui;

pub async fn run(config: ConfigSource<'_>, warm_up: WarmUp, _verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    ui::step("Warming up the network...");
    network
        .warm_up(warm_up)
        .await
        .context("Warm-up failed")?;

    ui::done("Network ready");
    ui::field("Mature coins", warm_up.mine_blocks);
    ui::field("Secondary node", warm_up.spawn_secondary);
    ui::field("Warm-up channel", warm_up.open_channels);
    Ok(())
}
