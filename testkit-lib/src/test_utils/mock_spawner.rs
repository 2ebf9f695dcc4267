//! Spawner handing out [`MockLightningNode`]s.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::MockLightningNode;
use crate::lightning::LightningNode;
use crate::scenario::NodeType;
use crate::spawn::NodeSpawner;
use crate::{Result, TestkitError};

#[derive(Debug, Default)]
struct SpawnerState {
    spawned: Vec<String>,
    connected: Vec<String>,
    nodes: HashMap<String, Arc<MockLightningNode>>,
}

/// Records spawn requests and creates a mock node per name.
#[derive(Debug, Default)]
pub struct MockSpawner {
    state: Mutex<SpawnerState>,
}

impl MockSpawner {
    fn state(&self) -> MutexGuard<'_, SpawnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawner without nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names passed to `spawn`, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.state().spawned.clone()
    }

    /// Names passed to `connect`, in order.
    pub fn connected(&self) -> Vec<String> {
        self.state().connected.clone()
    }

    /// The node created for `name`, if it was spawned.
    pub fn node(&self, name: &str) -> Option<Arc<MockLightningNode>> {
        self.state().nodes.get(name).cloned()
    }
}

#[async_trait]
impl NodeSpawner for MockSpawner {
    async fn spawn(&self, name: &str, _node_type: NodeType) -> Result<()> {
        let mut state = self.state();
        state.spawned.push(name.to_string());
        state
            .nodes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MockLightningNode::new(name)));
        Ok(())
    }

    async fn connect(&self, name: &str, _node_type: NodeType) -> Result<Arc<dyn LightningNode>> {
        let mut state = self.state();
        state.connected.push(name.to_string());
        let node = state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| TestkitError::Io(format!("node {} was never spawned", name)))?;
        Ok(node as Arc<dyn LightningNode>)
    }
}
