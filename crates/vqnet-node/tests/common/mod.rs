//! Shared fixtures for the node integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use vqnet_node::protocol::{Request, Response};
use vqnet_node::transport::{ConnectError, Connector, PeerClient};
use vqnet_node::{
    AppId, Config, InProcessConnector, LocalNetwork, NetworkConfig, Node, NodeEndpoint, NodeError,
    NodeResult, NodeSettings, VirtualId,
};

pub const ALICE: AppId = AppId(1);
pub const BOB: AppId = AppId(2);
pub const CHARLIE: AppId = AppId(3);

/// Settings with short delays so retries and timeouts resolve quickly.
pub fn fast_settings() -> NodeSettings {
    NodeSettings {
        conn_retry_ms: 10,
        recv_timeout_ms: 2_000,
        recv_retry_ms: 5,
        qubit_retry_ms: 5,
        lock_backoff_min_ms: 1,
        lock_backoff_max_ms: 20,
        max_lock_attempts: 1_000,
        ..NodeSettings::default()
    }
}

/// Fully connected network of `names`, ports counting up from 8801.
pub fn full_network(names: &[&str]) -> NetworkConfig {
    names
        .iter()
        .zip(8801u16..)
        .fold(NetworkConfig::new(), |network, (name, port)| {
            network.with_node(*name, NodeEndpoint::new("localhost", port))
        })
}

/// `Alice - Bob - Charlie`, Alice and Charlie not adjacent.
pub fn line_network() -> NetworkConfig {
    full_network(&["Alice", "Bob", "Charlie"])
        .with_link("Alice", "Bob")
        .with_link("Bob", "Charlie")
}

pub fn config_with(network: NetworkConfig, settings: NodeSettings) -> Config {
    let mut config = Config {
        settings,
        ..Config::default()
    };
    config.networks.insert("test".into(), network);
    config
}

/// Start an in-process network with fast settings.
pub async fn start(network: NetworkConfig) -> LocalNetwork {
    start_with(network, fast_settings()).await
}

pub async fn start_with(network: NetworkConfig, settings: NodeSettings) -> LocalNetwork {
    LocalNetwork::start(&config_with(network, settings), "test")
        .await
        .unwrap()
}

/// Three fully connected nodes.
pub async fn three_nodes() -> (LocalNetwork, Arc<Node>, Arc<Node>, Arc<Node>) {
    let net = start(full_network(&["Alice", "Bob", "Charlie"])).await;
    let alice = net.node("Alice").unwrap();
    let bob = net.node("Bob").unwrap();
    let charlie = net.node("Charlie").unwrap();
    (net, alice, bob, charlie)
}

/// Allocate a qubit on `from` and hand it to `app` on `to`.
///
/// The returned handle lives on `to`; the state stays on `from`.
pub async fn remote_qubit(from: &Node, to: &Node, app: AppId) -> VirtualId {
    let qubit = from.allocate(app).await.unwrap();
    from.send(qubit, to.name(), app).await.unwrap();
    to.recv(app).await.unwrap()
}

/// What happens to a request caught by [`FaultyConnector::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The peer never sees the request.
    LoseRequest,
    /// The peer serves the request but its reply never arrives.
    LoseReply,
}

type FaultRule = (String, fn(&Request) -> bool, Fault);

/// In-process connector that can break one chosen request.
#[derive(Clone, Default)]
pub struct FaultyConnector {
    inner: InProcessConnector,
    rule: Arc<Mutex<Option<FaultRule>>>,
}

impl FaultyConnector {
    /// Break the next request to `peer` accepted by `matches`.
    pub fn fail_next(&self, peer: &str, matches: fn(&Request) -> bool, fault: Fault) {
        *self.rule.lock().unwrap() = Some((peer.to_string(), matches, fault));
    }
}

#[async_trait]
impl Connector for FaultyConnector {
    async fn connect(
        &self,
        name: &str,
        endpoint: &NodeEndpoint,
    ) -> Result<Arc<dyn PeerClient>, ConnectError> {
        let inner = self.inner.connect(name, endpoint).await?;
        Ok(Arc::new(FaultyPeer {
            name: name.to_string(),
            inner,
            rule: Arc::clone(&self.rule),
        }))
    }
}

struct FaultyPeer {
    name: String,
    inner: Arc<dyn PeerClient>,
    rule: Arc<Mutex<Option<FaultRule>>>,
}

#[async_trait]
impl PeerClient for FaultyPeer {
    async fn call(&self, request: Request) -> NodeResult<Response> {
        let fault = self
            .rule
            .lock()
            .unwrap()
            .take_if(|(peer, matches, _)| *peer == self.name && (*matches)(&request))
            .map(|(_, _, fault)| fault);
        match fault {
            None => self.inner.call(request).await,
            Some(Fault::LoseRequest) => Err(NodeError::Transport(format!(
                "request to {} was lost",
                self.name
            ))),
            Some(Fault::LoseReply) => {
                let _ = self.inner.call(request).await;
                Err(NodeError::Transport(format!(
                    "reply from {} was lost",
                    self.name
                )))
            }
        }
    }
}

/// In-process network whose links can be broken on demand.
pub struct FaultyNetwork {
    pub connector: FaultyConnector,
    nodes: BTreeMap<String, Arc<Node>>,
}

impl FaultyNetwork {
    pub async fn start(network: NetworkConfig) -> Self {
        let connector = FaultyConnector::default();
        let mut nodes = BTreeMap::new();
        for name in network.node_names() {
            let node = Node::new(
                name,
                network.clone(),
                fast_settings(),
                Arc::new(connector.clone()),
            )
            .unwrap();
            connector.inner.register(&node);
            nodes.insert(name.to_string(), node);
        }
        for node in nodes.values() {
            node.connect_all().await.unwrap();
        }
        Self { connector, nodes }
    }

    pub fn node(&self, name: &str) -> Arc<Node> {
        Arc::clone(&self.nodes[name])
    }
}
