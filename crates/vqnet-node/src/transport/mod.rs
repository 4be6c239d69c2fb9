//! RPC channels between nodes.
//!
//! A [`PeerClient`] carries one [`Request`] to a peer and returns its reply.
//! [`Connector`]s open clients by peer name; [`RemoteNode`] wraps a client
//! with one typed method per request.
//!
//! | Transport | Client | Connector |
//! |-----------|--------|-----------|
//! | In-process | [`LocalPeer`] | [`InProcessConnector`] |
//! | TCP | [`TcpPeer`] | [`TcpConnector`] |

pub mod local;
pub mod tcp;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use vqnet_engine::{SingleQubitGate, TwoQubitGate};

use crate::config::NodeEndpoint;
use crate::error::{NodeError, NodeResult};
use crate::ids::{RegisterId, SimId, VirtualId};
use crate::protocol::{DeliveryNote, RegisterTransfer, Request, Response};
use crate::qubit::RegisterPosition;

pub use local::{InProcessConnector, LocalPeer};
pub use tcp::{TcpConnector, TcpPeer, serve};

/// A channel to one peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Send a request and wait for the peer's reply.
    async fn call(&self, request: Request) -> NodeResult<Response>;
}

/// Failure to open a channel.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The peer is not accepting connections yet; worth retrying.
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Any other failure.
    #[error(transparent)]
    Failed(#[from] NodeError),
}

/// Opens channels to peers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `name` at `endpoint`.
    async fn connect(
        &self,
        name: &str,
        endpoint: &NodeEndpoint,
    ) -> Result<Arc<dyn PeerClient>, ConnectError>;
}

/// Typed stub for a connected peer.
#[derive(Clone)]
pub struct RemoteNode {
    name: String,
    client: Arc<dyn PeerClient>,
}

impl fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNode").field("name", &self.name).finish()
    }
}

impl RemoteNode {
    /// Wrap a channel to `name`.
    pub fn new(name: impl Into<String>, client: Arc<dyn PeerClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Peer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a raw request.
    pub async fn call(&self, request: Request) -> NodeResult<Response> {
        self.client.call(request).await
    }

    pub async fn ping(&self) -> NodeResult<()> {
        self.call(Request::Ping).await?.into_unit()
    }

    pub async fn is_locked(&self) -> NodeResult<bool> {
        self.call(Request::IsLocked).await?.into_bool()
    }

    pub async fn try_acquire_global_lock(&self) -> NodeResult<bool> {
        self.call(Request::TryAcquireGlobalLock).await?.into_bool()
    }

    pub async fn acquire_global_lock(&self) -> NodeResult<()> {
        self.call(Request::AcquireGlobalLock).await?.into_unit()
    }

    pub async fn release_global_lock(&self) -> NodeResult<()> {
        self.call(Request::ReleaseGlobalLock).await?.into_unit()
    }

    pub async fn lock_registers(&self, sims: Vec<SimId>) -> NodeResult<()> {
        self.call(Request::LockRegisters { sims }).await?.into_unit()
    }

    pub async fn unlock_registers(&self, sims: Vec<SimId>) -> NodeResult<()> {
        self.call(Request::UnlockRegisters { sims })
            .await?
            .into_unit()
    }

    pub async fn apply_single(&self, sim: SimId, gate: SingleQubitGate) -> NodeResult<()> {
        self.call(Request::ApplySingle { sim, gate })
            .await?
            .into_unit()
    }

    pub async fn apply_two(
        &self,
        control: SimId,
        target: SimId,
        gate: TwoQubitGate,
    ) -> NodeResult<()> {
        self.call(Request::ApplyTwo {
            control,
            target,
            gate,
        })
        .await?
        .into_unit()
    }

    pub async fn measure(&self, sim: SimId, in_place: bool) -> NodeResult<u8> {
        self.call(Request::Measure { sim, in_place })
            .await?
            .into_outcome()
    }

    pub async fn reset(&self, sim: SimId) -> NodeResult<()> {
        self.call(Request::Reset { sim }).await?.into_unit()
    }

    pub async fn locate(&self, sim: SimId) -> NodeResult<RegisterPosition> {
        self.call(Request::Locate { sim }).await?.into_position()
    }

    pub async fn merge_local(&self, first: SimId, second: SimId) -> NodeResult<()> {
        self.call(Request::MergeLocal { first, second })
            .await?
            .into_unit()
    }

    pub async fn take_register(&self, sim: SimId) -> NodeResult<RegisterTransfer> {
        self.call(Request::TakeRegister { sim })
            .await?
            .into_register()
    }

    pub async fn commit_take_register(&self, register: RegisterId) -> NodeResult<()> {
        self.call(Request::CommitTakeRegister { register })
            .await?
            .into_unit()
    }

    pub async fn update_after_merge(
        &self,
        new_node: &str,
        old_node: &str,
        moved: Vec<(SimId, SimId)>,
    ) -> NodeResult<()> {
        self.call(Request::UpdateAfterMerge {
            new_node: new_node.to_string(),
            old_node: old_node.to_string(),
            moved,
        })
        .await?
        .into_unit()
    }

    pub async fn transfer_qubit(
        &self,
        sim: SimId,
        target: &str,
        note: DeliveryNote,
    ) -> NodeResult<VirtualId> {
        self.call(Request::TransferQubit {
            sim,
            target: target.to_string(),
            note,
        })
        .await?
        .into_virtual()
    }

    pub async fn add_qubit(
        &self,
        sim_node: &str,
        sim: SimId,
        note: DeliveryNote,
    ) -> NodeResult<VirtualId> {
        self.call(Request::AddQubit {
            sim_node: sim_node.to_string(),
            sim,
            note,
        })
        .await?
        .into_virtual()
    }
}
