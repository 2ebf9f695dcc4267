//! In-memory regtest chain.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chain::{ChainControl, COINBASE_MATURITY};
use crate::{Result, TestkitError};

/// Block subsidy paid to the wallet for every mined block.
pub const BLOCK_REWARD_SAT: u64 = 50 * 100_000_000;

/// Fee the mock charges per send.
pub const SEND_FEE_SAT: u64 = 1_000;

/// Calls that mutate the chain, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainCall {
    /// `generate_to_address(count, address)`
    Generate {
        /// Number of blocks
        count: u64,
        /// Coinbase address
        address: String,
    },
    /// `send_to_address(address, amount_sat)`
    Send {
        /// Destination
        address: String,
        /// Amount
        amount_sat: u64,
    },
    /// `create_wallet(name)`
    CreateWallet(String),
}

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    coinbase_blocks: u64,
    spent_sat: u64,
    mempool: Vec<String>,
    wallets: Vec<String>,
    next_address: u64,
    next_txid: u64,
    calls: Vec<ChainCall>,
    failing_address_calls: u32,
    failing_mempool_calls: u32,
}

/// A bitcoind stand-in with a single wallet.
///
/// Every generated block pays [`BLOCK_REWARD_SAT`] to the wallet, spendable
/// once it is [`COINBASE_MATURITY`] blocks deep. Sends land in the mempool
/// until the next block.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empty chain at height 0 without wallets.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Chain that already has a loaded wallet and `height` mined blocks.
    pub fn with_height(height: u64) -> Arc<Self> {
        let chain = Self::default();
        {
            let mut state = chain.state();
            state.height = height;
            state.coinbase_blocks = height;
            state.wallets.push("testkit".to_string());
        }
        Arc::new(chain)
    }

    /// Make the next `count` `new_address` calls fail.
    pub fn fail_new_address(&self, count: u32) {
        self.state().failing_address_calls = count;
    }

    /// Make the next `count` `mempool_size` calls fail.
    pub fn fail_mempool(&self, count: u32) {
        self.state().failing_mempool_calls = count;
    }

    /// Put a transaction in the mempool, as if another wallet broadcast it.
    pub fn broadcast(&self, txid: impl Into<String>) {
        self.state().mempool.push(txid.into());
    }

    /// Current height without going through the trait.
    pub fn height(&self) -> u64 {
        self.state().height
    }

    /// All mutating calls so far.
    pub fn calls(&self) -> Vec<ChainCall> {
        self.state().calls.clone()
    }

    /// Number of mutating calls so far.
    pub fn mutation_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Total number of blocks generated through the trait.
    pub fn generated_blocks(&self) -> u64 {
        self.calls()
            .iter()
            .map(|call| match call {
                ChainCall::Generate { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }

    /// Sends so far as `(address, amount_sat)`.
    pub fn sends(&self) -> Vec<(String, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChainCall::Send {
                    address,
                    amount_sat,
                } => Some((address, amount_sat)),
                _ => None,
            })
            .collect()
    }

    fn balance(state: &ChainState) -> u64 {
        let matured = state.coinbase_blocks.saturating_sub(COINBASE_MATURITY - 1);
        (matured * BLOCK_REWARD_SAT).saturating_sub(state.spent_sat)
    }

    fn require_wallet(state: &ChainState) -> Result<()> {
        if state.wallets.is_empty() {
            Err(TestkitError::remote_status(
                "getnewaddress",
                -18,
                Some("No wallet is loaded".to_string()),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainControl for MockChain {
    async fn list_wallets(&self) -> Result<Vec<String>> {
        Ok(self.state().wallets.clone())
    }

    async fn create_wallet(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.wallets.push(name.to_string());
        state.calls.push(ChainCall::CreateWallet(name.to_string()));
        Ok(())
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.state().height)
    }

    async fn mempool_size(&self) -> Result<u64> {
        let mut state = self.state();
        if state.failing_mempool_calls > 0 {
            state.failing_mempool_calls -= 1;
            return Err(TestkitError::Transport("connection reset".to_string()));
        }
        Ok(state.mempool.len() as u64)
    }

    async fn new_address(&self) -> Result<String> {
        let mut state = self.state();
        Self::require_wallet(&state)?;
        if state.failing_address_calls > 0 {
            state.failing_address_calls -= 1;
            return Err(TestkitError::remote_status("getnewaddress", 500, None));
        }
        state.next_address += 1;
        Ok(format!("bcrt1qchain{:06}", state.next_address))
    }

    async fn generate_to_address(&self, count: u64, address: &str) -> Result<Vec<String>> {
        let mut state = self.state();
        let first = state.height + 1;
        state.height += count;
        state.coinbase_blocks += count;
        state.mempool.clear();
        state.calls.push(ChainCall::Generate {
            count,
            address: address.to_string(),
        });
        Ok((first..=state.height)
            .map(|height| format!("{:064x}", height))
            .collect())
    }

    async fn balance_sat(&self) -> Result<u64> {
        let state = self.state();
        Self::require_wallet(&state)?;
        Ok(Self::balance(&state))
    }

    async fn send_to_address(&self, address: &str, amount_sat: u64) -> Result<String> {
        let mut state = self.state();
        Self::require_wallet(&state)?;
        if Self::balance(&state) < amount_sat + SEND_FEE_SAT {
            return Err(TestkitError::remote_status(
                "sendtoaddress",
                -6,
                Some("Insufficient funds".to_string()),
            ));
        }
        state.spent_sat += amount_sat + SEND_FEE_SAT;
        state.next_txid += 1;
        let txid = format!("{:064x}", state.next_txid);
        state.mempool.push(txid.clone());
        state.calls.push(ChainCall::Send {
            address: address.to_string(),
            amount_sat,
        });
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coinbase_matures_after_101_blocks() {
        let chain = MockChain::with_height(0);
        let address = chain.new_address().await.unwrap();

        chain.generate_to_address(100, &address).await.unwrap();
        assert_eq!(chain.balance_sat().await.unwrap(), 0);

        chain.generate_to_address(1, &address).await.unwrap();
        assert_eq!(chain.balance_sat().await.unwrap(), BLOCK_REWARD_SAT);
    }

    #[tokio::test]
    async fn test_send_goes_through_mempool() {
        let chain = MockChain::with_height(101);
        chain.send_to_address("bcrt1qdest", 1_000).await.unwrap();
        assert_eq!(chain.mempool_size().await.unwrap(), 1);

        chain.generate_to_address(1, "bcrt1qminer").await.unwrap();
        assert_eq!(chain.mempool_size().await.unwrap(), 0);
        assert_eq!(chain.sends(), vec![("bcrt1qdest".to_string(), 1_000)]);
    }

    #[tokio::test]
    async fn test_wallet_required() {
        let chain = MockChain::new();
        assert!(chain.new_address().await.is_err());
        chain.create_wallet("testkit").await.unwrap();
        assert!(chain.new_address().await.is_ok());
    }
}
