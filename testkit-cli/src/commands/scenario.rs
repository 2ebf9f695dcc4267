//! Scenario command - spawn the nodes and channels of a scenario file

use super::ConfigSource;
use anyhow::{Context, Result};
use std::path::Path;

use crate::ui;

pub async fn run(config: ConfigSource<'_>, file: &Path, _verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    ui::step(&format!("Loading scenario {}", file.display()));
    let loaded = network
        .load_scenario_file(file)
        .await
        .with_context(|| format!("Failed to load scenario {}", file.display()))?;

    ui::section("Nodes");
    for node in &loaded.nodes {
        ui::field(&node.name, &node.identity);
    }

    ui::section("Channels");
    for channel in &loaded.channels {
        ui::field(
            &format!("{} -> {}", channel.initiator, channel.receiver),
            &channel.channel,
        );
    }

    ui::done("Scenario loaded");
    Ok(())
}
