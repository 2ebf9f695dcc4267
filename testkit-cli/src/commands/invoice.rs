//! Invoice command - issue an invoice from the primary node

use super::ConfigSource;
use anyhow::{Context, Result};

use crate::ui;

pub async fn run(
    config: ConfigSource<'_>,
    amount_msat: u64,
    memo: Option<&str>,
    wait: bool,
    _verbose: bool,
) -> Result<()> {
    let network = super::connect(config)?;

    let invoice = network
        .create_lightning_invoice(amount_msat, memo)
        .await
        .context("Failed to create invoice")?;

    ui::section("Invoice");
    ui::field("Amount", format!("{} msat", amount_msat));
    ui::field("Invoice", invoice.invoice());
    ui::field("URI", invoice.payment_uri());

    if wait {
        ui::step("Waiting for payment...");
        if invoice.wait_paid().await.context("Failed to wait for payment")? {
            ui::done("Invoice paid");
        } else {
            ui::failed("Invoice expired unpaid");
        }
    }
    Ok(())
}
