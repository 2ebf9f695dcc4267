//! Chain-payment path.
//!
//! Regtest coins only exist once someone mines them, so every on-chain
//! payment first mines until the wallet can afford it, then sends and
//! confirms. The liquidity engine funds channel openings through the same
//! path.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainControl, COINBASE_MATURITY};
use crate::Result;

/// Pessimistic fee reserve kept on top of every payment.
pub const FEE_BUFFER_SAT: u64 = 100_000;

/// Confirmations given to payments and channel openings.
pub const CONFIRMATIONS: u64 = 6;

/// Pays and confirms on-chain payments from the bitcoind wallet.
#[derive(Clone)]
pub struct ChainFunder {
    chain: Arc<dyn ChainControl>,
    retry_pause: Duration,
}

impl ChainFunder {
    /// Funder spending from `chain`'s wallet.
    pub fn new(chain: Arc<dyn ChainControl>) -> Self {
        Self {
            chain,
            retry_pause: Duration::from_secs(5),
        }
    }

    /// Set the pause before retrying a failed mining-address request.
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// The chain this funder drives.
    pub fn chain(&self) -> &Arc<dyn ChainControl> {
        &self.chain
    }

    /// Mine coinbase batches until the wallet holds `amount_sat` plus the fee
    /// reserve.
    pub async fn ensure_balance(&self, amount_sat: u64) -> Result<()> {
        let needed = amount_sat.saturating_add(FEE_BUFFER_SAT);
        loop {
            let balance = self.chain.balance_sat().await?;
            if balance >= needed {
                return Ok(());
            }
            tracing::debug!(balance, needed, "mining to fund the wallet");
            self.mine(COINBASE_MATURITY).await?;
        }
    }

    /// Send `amount_sat` to `address` and confirm it.
    ///
    /// Returns the txid.
    #[tracing::instrument(skip(self))]
    pub async fn pay_to_address(&self, address: &str, amount_sat: u64) -> Result<String> {
        self.ensure_balance(amount_sat).await?;
        let txid = self.chain.send_to_address(address, amount_sat).await?;
        self.mine(CONFIRMATIONS).await?;

        tracing::info!(%txid, "payment confirmed");
        Ok(txid)
    }

    /// Mine `count` blocks to a fresh wallet address.
    pub async fn mine(&self, count: u64) -> Result<Vec<String>> {
        let address = self.chain.new_address().await?;
        self.chain.generate_to_address(count, &address).await
    }

    /// Mine `count` blocks, retrying the address request once.
    ///
    /// bitcoind occasionally refuses `getnewaddress` right after a channel
    /// funding transaction was broadcast.
    pub async fn confirm_with_retry(&self, count: u64) -> Result<Vec<String>> {
        let address = match self.chain.new_address().await {
            Ok(address) => address,
            Err(err) => {
                tracing::warn!(error = %err, pause = ?self.retry_pause, "getting a mining address failed, retrying");
                tokio::time::sleep(self.retry_pause).await;
                self.chain.new_address().await?
            }
        };
        self.chain.generate_to_address(count, &address).await
    }

    /// Mine until the chain is at least `height` blocks high.
    pub async fn ensure_height(&self, height: u64) -> Result<()> {
        let current = self.chain.block_height().await?;
        if current < height {
            tracing::info!(current, target = height, "mining initial blocks");
            self.mine(height - current).await?;
        }
        Ok(())
    }
}
