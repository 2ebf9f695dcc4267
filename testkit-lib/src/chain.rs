//! Chain-control collaborator.
//!
//! Everything the orchestrator needs from the regtest bitcoind wallet. The
//! production implementation is [`BitcoindRpc`](crate::executors::BitcoindRpc).

use async_trait::async_trait;

use crate::Result;

/// Blocks needed before a coinbase output is spendable.
pub const COINBASE_MATURITY: u64 = 101;

/// Regtest chain and wallet control.
#[async_trait]
pub trait ChainControl: Send + Sync {
    /// Names of the wallets loaded by the node.
    async fn list_wallets(&self) -> Result<Vec<String>>;

    /// Create (and load) a wallet.
    async fn create_wallet(&self, name: &str) -> Result<()>;

    /// Current block height.
    async fn block_height(&self) -> Result<u64>;

    /// Number of transactions waiting in the mempool.
    async fn mempool_size(&self) -> Result<u64>;

    /// Fresh address of the node wallet.
    async fn new_address(&self) -> Result<String>;

    /// Mine `count` blocks paying the coinbase to `address`.
    ///
    /// Returns the hashes of the new blocks.
    async fn generate_to_address(&self, count: u64, address: &str) -> Result<Vec<String>>;

    /// Spendable wallet balance.
    async fn balance_sat(&self) -> Result<u64>;

    /// Send `amount_sat` from the node wallet, returning the txid.
    async fn send_to_address(&self, address: &str, amount_sat: u64) -> Result<String>;
}
