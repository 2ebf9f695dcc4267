//! Background mining.
//!
//! Applications under test usually broadcast transactions and then wait for
//! confirmations that never come on an idle regtest chain. The auto-miner
//! polls the mempool and mines a few blocks whenever something is pending.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::chain::ChainControl;
use crate::{Result, TestkitError};

/// Default pause between two mempool polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of blocks mined per non-empty poll.
pub const DEFAULT_CONFIRM_BLOCKS: u64 = 6;

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Mines pending transactions in a background task.
///
/// At most one worker runs at a time.
pub struct AutoMiner {
    chain: Arc<dyn ChainControl>,
    worker: Mutex<Option<Worker>>,
}

impl AutoMiner {
    /// Miner for `chain`, initially stopped.
    pub fn new(chain: Arc<dyn ChainControl>) -> Self {
        Self {
            chain,
            worker: Mutex::new(None),
        }
    }

    /// Start the worker.
    ///
    /// # Errors
    ///
    /// [`TestkitError::InvariantViolation`] if the miner is already running,
    /// `poll_interval` is shorter than a second or `confirm_blocks` is zero.
    pub async fn start(&self, poll_interval: Duration, confirm_blocks: u64) -> Result<()> {
        if poll_interval < Duration::from_secs(1) {
            return Err(TestkitError::invariant(
                "auto mining poll interval must be at least one second",
            ));
        }
        if confirm_blocks < 1 {
            return Err(TestkitError::invariant(
                "auto mining must confirm at least one block",
            ));
        }

        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(TestkitError::invariant("auto mining is already running"));
        }

        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.chain.clone(),
            poll_interval,
            confirm_blocks,
            stopped,
        ));
        *worker = Some(Worker { stop, handle });

        tracing::info!(?poll_interval, confirm_blocks, "auto mining started");
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Once this returns the worker issues no further chain calls.
    pub async fn stop(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .await
            .take()
            .ok_or_else(|| TestkitError::invariant("auto mining is not running"))?;

        // The receiver only goes away when the task already finished.
        let _ = worker.stop.send(true);
        if let Err(err) = worker.handle.await {
            tracing::warn!(error = %err, "auto mining task did not exit cleanly");
        }

        tracing::info!("auto mining stopped");
        Ok(())
    }

    /// Whether the worker is running.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

impl Drop for AutoMiner {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.stop.send(true);
            worker.handle.abort();
        }
    }
}

async fn run(
    chain: Arc<dyn ChainControl>,
    poll_interval: Duration,
    confirm_blocks: u64,
    mut stop: watch::Receiver<bool>,
) {
    while !*stop.borrow() {
        if let Err(err) = mine_pending(chain.as_ref(), confirm_blocks).await {
            tracing::warn!(error = %err, "auto mining cycle failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn mine_pending(chain: &dyn ChainControl, confirm_blocks: u64) -> Result<()> {
    let pending = chain.mempool_size().await?;
    if pending == 0 {
        return Ok(());
    }

    let address = chain.new_address().await?;
    chain.generate_to_address(confirm_blocks, &address).await?;
    tracing::debug!(pending, confirm_blocks, "mined pending transactions");
    Ok(())
}
