//! Distributed virtual-qubit registers.
//!
//! Applications hold *virtual qubits* on the node they talk to, while the
//! quantum state lives in *registers* that may sit on any node of the
//! network. Gates are routed to the simulating node; a two-qubit gate on
//! qubits in different registers first merges the registers, moving state
//! across the network when needed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Request/Response  ┌──────────────┐
//! │ Node "Alice" │ ◄────────────────► │ Node "Bob"   │
//! │  virtual ids │   (in-process or   │  virtual ids │
//! │  registers   │    TCP transport)  │  registers   │
//! └──────┬───────┘                    └──────────────┘
//!        │ Box<dyn Engine>
//!        ▼
//!  vqnet-adapter-statevector / vqnet-adapter-stabilizer
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use vqnet_node::{AppId, Config, LocalNetwork, NetworkConfig, NodeEndpoint};
//!
//! # async fn run() -> vqnet_node::NodeResult<()> {
//! let mut config = Config::default();
//! config.networks.insert(
//!     "default".into(),
//!     NetworkConfig::new()
//!         .with_node("Alice", NodeEndpoint::new("localhost", 8801))
//!         .with_node("Bob", NodeEndpoint::new("localhost", 8802)),
//! );
//! let network = LocalNetwork::start(&config, "default").await?;
//! let alice = network.node("Alice")?;
//! let bob = network.node("Bob")?;
//!
//! let pair = alice.create_epr(AppId(1), "Bob", AppId(2)).await?;
//! let other = bob.recv_epr(AppId(2)).await?;
//! assert_eq!(
//!     alice.measure(pair.qubit, false).await?,
//!     bob.measure(other.qubit, false).await?,
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entanglement;
pub mod error;
pub mod ids;
pub mod lock;
pub mod network;
pub mod node;
pub mod protocol;
pub mod qubit;
pub mod register;
pub mod state;
pub mod tracing_config;
pub mod transport;

pub use config::{
    Config, ConfigError, DEFAULT_BASE_PORT, DEFAULT_NETWORK, DEFAULT_NODES, EngineKind,
    LoggingConfig, NetworkConfig, NodeEndpoint, NodeSettings,
};
pub use entanglement::{Directionality, EntanglementInfo};
pub use error::{NodeError, NodeResult};
pub use ids::{AppId, QubitRef, RegisterId, SimId, VirtualId};
pub use network::LocalNetwork;
pub use node::{EprHalf, Node};
pub use qubit::{QubitInfo, QubitLocation};
pub use tracing_config::{TracingConfig, TracingFormat, init_tracing};
pub use transport::{InProcessConnector, RemoteNode, TcpConnector, serve};
