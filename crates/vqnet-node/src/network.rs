//! A whole network of nodes in one process.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{NodeError, NodeResult};
use crate::node::Node;
use crate::transport::InProcessConnector;

/// Every node of one configured network, wired through the in-process
/// transport.
#[derive(Debug)]
pub struct LocalNetwork {
    nodes: BTreeMap<String, Arc<Node>>,
}

impl LocalNetwork {
    /// Build and connect every node of network `name`.
    pub async fn start(config: &Config, name: &str) -> NodeResult<Self> {
        let network = config.network(name)?;
        let connector = InProcessConnector::new();
        let mut nodes = BTreeMap::new();
        for node_name in network.node_names() {
            let node = Node::new(
                node_name,
                network.clone(),
                config.settings.clone(),
                Arc::new(connector.clone()),
            )?;
            connector.register(&node);
            nodes.insert(node_name.to_string(), node);
        }
        for node in nodes.values() {
            node.connect_all().await?;
        }
        info!(network = name, nodes = nodes.len(), "Started in-process network");
        Ok(Self { nodes })
    }

    /// Node `name`.
    pub fn node(&self, name: &str) -> NodeResult<Arc<Node>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::Unknown(format!("{name} is not part of the network")))
    }

    /// All nodes, by name.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }
}
