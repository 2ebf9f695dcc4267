//! Node spawning collaborator.
//!
//! Spawning is split in two so that a whole scenario can be launched at once
//! and waited on afterwards: [`NodeSpawner::spawn`] writes configuration and
//! starts the process without waiting, [`NodeSpawner::connect`] waits for the
//! credentials to appear and returns a client.

use async_trait::async_trait;
use std::sync::Arc;

use crate::lightning::LightningNode;
use crate::scenario::NodeType;
use crate::Result;

/// Creates and launches local Lightning nodes.
#[async_trait]
pub trait NodeSpawner: Send + Sync {
    /// Generate the configuration of node `name` and launch it.
    ///
    /// Must not wait for the node to become ready. Spawning a node whose
    /// configuration already exists reuses it.
    async fn spawn(&self, name: &str, node_type: NodeType) -> Result<()>;

    /// Client for a node previously passed to [`NodeSpawner::spawn`].
    ///
    /// Blocks until the node's credentials are available, but not until the
    /// node is synced; callers use [`LightningNode::wait_init`] for that.
    async fn connect(&self, name: &str, node_type: NodeType) -> Result<Arc<dyn LightningNode>>;
}
