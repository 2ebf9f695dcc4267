//! Bounded sleep-poll waiting.
//!
//! Every place the orchestrator waits on node or chain state (node readiness,
//! channel activation, invoice settlement) goes through [`WaitConfig::until`].
//! Without a timeout the wait is unbounded, matching how regtest nodes are
//! usually driven; test suites that prefer a hard failure set one.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::{Result, TestkitError};

/// How to poll for a condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Pause between two polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up after this many milliseconds. `None` waits forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: None,
        }
    }
}

impl WaitConfig {
    /// Create a wait policy polling every `poll_interval`, without timeout.
    pub fn every(poll_interval: Duration) -> Self {
        Self {
            poll_interval_ms: poll_interval.as_millis() as u64,
            timeout_ms: None,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Remove the timeout.
    pub fn unbounded(mut self) -> Self {
        self.timeout_ms = None;
        self
    }

    /// Pause between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Poll `check` until it yields `Some`, sleeping between attempts.
    ///
    /// Errors returned by `check` abort the wait. Use [`WaitConfig::until_ok`]
    /// for conditions whose errors mean "not yet".
    pub async fn until<T, F, Fut>(&self, operation: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            self.pause(operation, started).await?;
        }
    }

    /// Poll `check` until it yields `Some`, treating errors as "not yet".
    pub async fn until_ok<T, F, Fut>(&self, operation: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        loop {
            match check().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => tracing::debug!(%operation, error = %err, "still waiting"),
            }
            self.pause(operation, started).await?;
        }
    }

    async fn pause(&self, operation: &str, started: Instant) -> Result<()> {
        if let Some(timeout) = self.timeout() {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(TestkitError::Timeout {
                    operation: operation.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
        }
        tokio::time::sleep(self.poll_interval()).await;
        Ok(())
    }
}
