//! Registry of the Lightning nodes a network knows about.
//!
//! Three kinds of nodes live here:
//!
//! - the primary node, fixed at construction (the node of the app under test
//!   usually pays from or to it)
//! - the secondary node, spawned on first use and cached, which pays the
//!   invoices handed to [`Network::auto_pay`](crate::Network::auto_pay)
//! - scenario nodes, indexed by name and by identity
//!
//! The registry only grows. Locks are never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;

use crate::lightning::{LightningNode, P2PAddress};
use crate::scenario::NodeType;
use crate::spawn::NodeSpawner;
use crate::{Result, TestkitError};

/// Instance name of the lazily spawned secondary node.
pub const SECONDARY_NODE_ID: &str = "1";

type NodeRef = Arc<dyn LightningNode>;

/// Nodes of a test network.
pub struct NodeRegistry {
    primary: NodeRef,
    spawner: Arc<dyn NodeSpawner>,
    secondary: OnceCell<NodeRef>,
    by_name: RwLock<HashMap<String, NodeRef>>,
    by_identity: RwLock<HashMap<String, NodeRef>>,
}

impl NodeRegistry {
    /// Registry around `primary`; the secondary node is spawned with `spawner`.
    pub fn new(primary: NodeRef, spawner: Arc<dyn NodeSpawner>) -> Self {
        Self {
            primary,
            spawner,
            secondary: OnceCell::new(),
            by_name: RwLock::new(HashMap::new()),
            by_identity: RwLock::new(HashMap::new()),
        }
    }

    /// Use an already running node as the secondary instead of spawning one.
    pub fn with_secondary(mut self, secondary: NodeRef) -> Self {
        self.secondary = OnceCell::new_with(Some(secondary));
        self
    }

    /// The primary node.
    pub fn primary(&self) -> NodeRef {
        self.primary.clone()
    }

    /// The node spawner.
    pub fn spawner(&self) -> Arc<dyn NodeSpawner> {
        self.spawner.clone()
    }

    /// The secondary node, spawning it if needed, once it is ready.
    ///
    /// Concurrent callers share a single spawn.
    #[tracing::instrument(skip(self))]
    pub async fn secondary(&self) -> Result<NodeRef> {
        let node = self
            .secondary
            .get_or_try_init(|| async {
                tracing::info!(id = SECONDARY_NODE_ID, "spawning secondary node");
                self.spawner.spawn(SECONDARY_NODE_ID, NodeType::Lnd).await?;
                self.spawner.connect(SECONDARY_NODE_ID, NodeType::Lnd).await
            })
            .await?
            .clone();

        node.wait_init().await?;
        Ok(node)
    }

    /// The secondary node if it was already spawned.
    pub fn secondary_if_spawned(&self) -> Option<NodeRef> {
        self.secondary.get().cloned()
    }

    /// Add a scenario node, indexing it by `name` and by its identity.
    pub async fn register(&self, name: &str, node: NodeRef) -> Result<String> {
        if self.contains(name) {
            return Err(TestkitError::invariant(format!(
                "node {} is already registered",
                name
            )));
        }
        let identity = node.identity().await?;

        self.by_identity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), node.clone());
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), node);

        tracing::debug!(name, %identity, "registered node");
        Ok(identity)
    }

    /// Whether a scenario node called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Scenario node by name.
    pub fn node(&self, name: &str) -> Option<NodeRef> {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Scenario node by identity.
    pub fn node_by_identity(&self, identity: &str) -> Option<NodeRef> {
        self.by_identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Names of all scenario nodes, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Network address of the node with `identity`.
    ///
    /// Looks at the primary, the secondary (if spawned) and then the scenario
    /// nodes.
    pub async fn resolve_address(&self, identity: &str) -> Result<P2PAddress> {
        let address = self.primary.p2p_address().await?;
        if address.identity == identity {
            return Ok(address);
        }

        if let Some(secondary) = self.secondary_if_spawned() {
            let address = secondary.p2p_address().await?;
            if address.identity == identity {
                return Ok(address);
            }
        }

        match self.node_by_identity(identity) {
            Some(node) => node.p2p_address().await,
            None => Err(TestkitError::UnknownNode {
                identity: identity.to_string(),
            }),
        }
    }
}
