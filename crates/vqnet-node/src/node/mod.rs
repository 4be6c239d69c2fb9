//! Nodes: peers of a virtual-qubit network.
//!
//! A node plays two roles. As a *virtual node* it hands out [`VirtualId`]s to
//! applications and drives every operation on them. As a *simulating node*
//! it owns registers and serves the [`Request`]s other nodes (or itself)
//! send while carrying those operations out.
//!
//! Calls to the node itself go through a loopback peer, so "local call or
//! RPC" is a single code path.
//!
//! # Locking
//!
//! - The node's bookkeeping sits behind a std mutex that is never held
//!   across an await point.
//! - The global lock guards register topology: allocation, merges, removal
//!   and hand-off.
//! - Per-qubit locks guard engine state. Global locks are always taken
//!   before qubit locks.

mod handler;
mod merge;
mod transfer;
mod virtual_ops;

pub use transfer::EprHalf;

use futures::future::join_all;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, instrument};

use crate::config::{NetworkConfig, NodeSettings};
use crate::error::{NodeError, NodeResult};
use crate::lock::AsyncLock;
use crate::state::NodeState;
use crate::transport::{ConnectError, Connector, LocalPeer, RemoteNode};

#[cfg(doc)]
use crate::{ids::VirtualId, protocol::Request};

/// A node of a virtual-qubit network.
pub struct Node {
    name: String,
    network: NetworkConfig,
    settings: NodeSettings,
    connector: Arc<dyn Connector>,
    state: Mutex<NodeState>,
    global_lock: AsyncLock,
    peers: Mutex<FxHashMap<String, RemoteNode>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("locked", &self.global_lock.is_locked())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create node `name` of `network`.
    ///
    /// Fails with [`NodeError::Unknown`] when the network has no such node.
    pub fn new(
        name: &str,
        network: NetworkConfig,
        settings: NodeSettings,
        connector: Arc<dyn Connector>,
    ) -> NodeResult<Arc<Self>> {
        if !network.contains(name) {
            return Err(NodeError::Unknown(format!(
                "{name} is not part of the network"
            )));
        }
        let node = Arc::new_cyclic(|this: &Weak<Node>| {
            let mut peers = FxHashMap::default();
            peers.insert(
                name.to_string(),
                RemoteNode::new(name, Arc::new(LocalPeer::new(this.clone()))),
            );
            Self {
                name: name.to_string(),
                state: Mutex::new(NodeState::new(name, &settings)),
                network,
                settings,
                connector,
                global_lock: AsyncLock::new(),
                peers: Mutex::new(peers),
            }
        });
        info!(node = %node.name, "Node created");
        Ok(node)
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network this node belongs to.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Limits and timings.
    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_peer(&self, name: &str) -> Option<RemoteNode> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    // =========================================================================
    // Topology and connections
    // =========================================================================

    /// Whether this node may exchange qubits with `peer`.
    pub fn is_adjacent(&self, peer: &str) -> bool {
        self.network.is_adjacent(&self.name, peer)
    }

    fn endpoint_of(&self, peer: &str) -> NodeResult<&crate::config::NodeEndpoint> {
        self.network
            .endpoint(peer)
            .ok_or_else(|| NodeError::Unknown(format!("{peer} is not part of the network")))
    }

    fn add_peer(&self, remote: RemoteNode) -> RemoteNode {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(remote.name().to_string())
            .or_insert(remote)
            .clone()
    }

    /// Connect to `peer`, retrying while the connection is refused.
    ///
    /// Idempotent: an existing connection is returned as is.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn connect(&self, peer: &str) -> NodeResult<RemoteNode> {
        if let Some(remote) = self.cached_peer(peer) {
            return Ok(remote);
        }
        let endpoint = self.endpoint_of(peer)?.clone();
        loop {
            match self.connector.connect(peer, &endpoint).await {
                Ok(client) => {
                    info!(peer, %endpoint, "Connected");
                    return Ok(self.add_peer(RemoteNode::new(peer, client)));
                }
                Err(ConnectError::Refused(reason)) => {
                    debug!(peer, %reason, "Connection refused, retrying");
                    tokio::time::sleep(self.settings.conn_retry()).await;
                }
                Err(ConnectError::Failed(e)) => return Err(e),
            }
        }
    }

    /// Single connection attempt. `Ok(false)` when the peer refused.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn try_connect(&self, peer: &str) -> NodeResult<bool> {
        if self.cached_peer(peer).is_some() {
            return Ok(true);
        }
        let endpoint = self.endpoint_of(peer)?.clone();
        match self.connector.connect(peer, &endpoint).await {
            Ok(client) => {
                self.add_peer(RemoteNode::new(peer, client));
                Ok(true)
            }
            Err(ConnectError::Refused(_)) => Ok(false),
            Err(ConnectError::Failed(e)) => Err(e),
        }
    }

    /// Connect to every node of the network.
    pub async fn connect_all(&self) -> NodeResult<()> {
        let names: Vec<String> = self.network.node_names().map(String::from).collect();
        let results = join_all(names.iter().map(|name| self.connect(name))).await;
        for result in results {
            result?;
        }
        info!(node = %self.name, peers = names.len(), "Connected to all peers");
        Ok(())
    }

    /// Whether a connection to every node of the network is up.
    pub fn check_connections(&self) -> bool {
        let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        self.network.node_names().all(|name| peers.contains_key(name))
    }

    /// Stub for `peer`, connecting on first use.
    pub async fn remote(&self, peer: &str) -> NodeResult<RemoteNode> {
        match self.cached_peer(peer) {
            Some(remote) => Ok(remote),
            None => self.connect(peer).await,
        }
    }

    // =========================================================================
    // Global lock
    // =========================================================================

    /// Wait for this node's global lock.
    pub async fn acquire_global_lock(&self) {
        self.global_lock.acquire().await;
    }

    /// Take this node's global lock if it is free.
    pub fn try_acquire_global_lock(&self) -> bool {
        self.global_lock.try_acquire()
    }

    /// Release this node's global lock.
    pub fn release_global_lock(&self) {
        self.global_lock.release();
    }

    /// Whether this node's global lock is held.
    pub fn is_locked(&self) -> bool {
        self.global_lock.is_locked()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of registers simulated here.
    pub fn register_count(&self) -> usize {
        self.state().register_count()
    }

    /// Number of qubits simulated here.
    pub fn simulated_count(&self) -> usize {
        self.state().simulated_count()
    }

    /// Number of virtual qubits held here, pending deliveries included.
    pub fn virtual_count(&self) -> usize {
        self.state().virtual_count()
    }
}
