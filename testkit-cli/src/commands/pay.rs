//! Pay commands - pay a link or a legacy address/amount pair

use super::ConfigSource;
use anyhow::{Context, Result};

use crate::ui;

pub async fn run(config: ConfigSource<'_>, link: &str, _verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    ui::step(&format!("Paying {}", link));
    let receipt = network
        .auto_pay(link)
        .await
        .with_context(|| format!("Failed to pay {}", link))?;

    ui::receipt(&receipt);
    Ok(())
}

pub async fn legacy(config: ConfigSource<'_>, address: &str, amount: &str, _verbose: bool) -> Result<()> {
    let network = super::connect(config)?;

    ui::step(&format!("Sending {} BTC to {}", amount, address));
    let receipt = network
        .auto_pay_legacy(address, amount)
        .await
        .with_context(|| format!("Failed to send {} BTC to {}", amount, address))?;

    ui::receipt(&receipt);
    Ok(())
}
