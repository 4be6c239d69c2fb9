//! In-process transport.
//!
//! Every call runs [`Node::handle`] on its own tokio task, so a node serving
//! a request can call back into the caller without re-entering its stack.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{ConnectError, Connector, PeerClient};
use crate::config::NodeEndpoint;
use crate::error::{NodeError, NodeResult};
use crate::node::Node;
use crate::protocol::{Request, Response};

/// Channel to a node living in the same process.
#[derive(Debug, Clone)]
pub struct LocalPeer {
    node: Weak<Node>,
}

impl LocalPeer {
    pub fn new(node: Weak<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl PeerClient for LocalPeer {
    async fn call(&self, request: Request) -> NodeResult<Response> {
        let node = self
            .node
            .upgrade()
            .ok_or_else(|| NodeError::Transport("peer node has shut down".into()))?;
        tokio::spawn(async move { node.handle(request).await })
            .await
            .map_err(|e| NodeError::Transport(format!("request task failed: {e}")))?
    }
}

/// Connects nodes registered in one process.
///
/// A name that has not been registered yet is reported as refused, so
/// [`Node::connect`] keeps retrying until the node appears.
#[derive(Debug, Clone, Default)]
pub struct InProcessConnector {
    nodes: Arc<Mutex<FxHashMap<String, Weak<Node>>>>,
}

impl InProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` reachable under its name.
    pub fn register(&self, node: &Arc<Node>) {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.name().to_string(), Arc::downgrade(node));
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(
        &self,
        name: &str,
        _endpoint: &NodeEndpoint,
    ) -> Result<Arc<dyn PeerClient>, ConnectError> {
        let node = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectError::Refused(format!("{name} is not registered")))?;
        Ok(Arc::new(LocalPeer::new(node)))
    }
}
