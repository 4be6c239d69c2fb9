//! Node-to-node RPC messages.
//!
//! Every remote operation is one [`Request`] answered by one
//! `NodeResult<Response>`. The same messages are used by the in-process and
//! the TCP transport.

use serde::{Deserialize, Serialize};

use vqnet_engine::{SingleQubitGate, StateBlob, TwoQubitGate};

use crate::entanglement::EntanglementInfo;
use crate::error::{NodeError, NodeResult};
use crate::ids::{AppId, RegisterId, SimId, VirtualId};
use crate::qubit::RegisterPosition;

/// Which pending queue a delivery goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryQueue {
    /// Consumed by `recv`.
    Plain,
    /// Consumed by `recv_epr`.
    Epr,
}

/// A qubit announced to a receiving application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    /// Sending node.
    pub from_node: String,
    /// Sending application.
    pub from_app: AppId,
    /// Receiving application.
    pub to_app: AppId,
    /// Pending virtual qubit on the receiving node.
    pub qubit: VirtualId,
    /// Pair metadata, present for EPR halves.
    pub entanglement: Option<EntanglementInfo>,
}

/// How a handed-over qubit is announced on the receiving node.
///
/// Travels with the hand-off itself, so the pending qubit and its queue
/// entry appear on the receiver in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNote {
    /// Queue the receiver reads from.
    pub queue: DeliveryQueue,
    /// Sending node.
    pub from_node: String,
    /// Sending application.
    pub from_app: AppId,
    /// Receiving application.
    pub to_app: AppId,
    /// Pair metadata, present for EPR halves.
    pub entanglement: Option<EntanglementInfo>,
}

impl DeliveryNote {
    /// The queue entry for pending qubit `qubit`.
    pub fn into_delivery(self, qubit: VirtualId) -> PendingDelivery {
        PendingDelivery {
            from_node: self.from_node,
            from_app: self.from_app,
            to_app: self.to_app,
            qubit,
            entanglement: self.entanglement,
        }
    }
}

/// A register handed over by its node during a cross-node merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTransfer {
    /// Id the register had on its old node.
    pub register: RegisterId,
    /// Engine state.
    pub blob: StateBlob,
    /// Old simulated qubit ids in slot order.
    pub slots: Vec<SimId>,
}

/// Requests a node serves for its peers (and itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Whether the global lock is held.
    IsLocked,
    /// Take the global lock if it is free.
    TryAcquireGlobalLock,
    /// Wait for the global lock.
    AcquireGlobalLock,
    /// Release the global lock.
    ReleaseGlobalLock,
    /// Lock every qubit of the registers holding `sims`.
    LockRegisters { sims: Vec<SimId> },
    /// Unlock every qubit of the registers holding `sims`.
    UnlockRegisters { sims: Vec<SimId> },
    /// Apply a single-qubit gate under the qubit's lock.
    ApplySingle { sim: SimId, gate: SingleQubitGate },
    /// Apply a two-qubit gate; the caller holds the qubit locks.
    ApplyTwo {
        control: SimId,
        target: SimId,
        gate: TwoQubitGate,
    },
    /// Measure a qubit, removing it unless `in_place`.
    Measure { sim: SimId, in_place: bool },
    /// Measure in place and flip back to `|0⟩`.
    Reset { sim: SimId },
    /// Register and slot of a qubit.
    Locate { sim: SimId },
    /// Merge the register of `second` into that of `first`.
    MergeLocal { first: SimId, second: SimId },
    /// Copy out the register holding `sim`; the node keeps it.
    TakeRegister { sim: SimId },
    /// Delete a register whose copy was absorbed elsewhere.
    CommitTakeRegister { register: RegisterId },
    /// Repoint virtual qubits whose state moved between nodes.
    UpdateAfterMerge {
        new_node: String,
        old_node: String,
        moved: Vec<(SimId, SimId)>,
    },
    /// Hand a simulated qubit to a new virtual owner on `target`.
    TransferQubit {
        sim: SimId,
        target: String,
        note: DeliveryNote,
    },
    /// Create a pending virtual qubit for a state simulated on `sim_node`
    /// and queue it for the receiving application.
    AddQubit {
        sim_node: String,
        sim: SimId,
        note: DeliveryNote,
    },
}

/// Successful replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Response {
    Unit,
    Bool(bool),
    Outcome(u8),
    Virtual(VirtualId),
    Position(RegisterPosition),
    Register(RegisterTransfer),
}

fn unexpected<T>(expected: &str, got: &Response) -> NodeResult<T> {
    Err(NodeError::Quantum(format!(
        "expected {expected} response, got {got:?}"
    )))
}

impl Response {
    /// Expect [`Response::Unit`].
    pub fn into_unit(self) -> NodeResult<()> {
        match self {
            Response::Unit => Ok(()),
            other => unexpected("unit", &other),
        }
    }

    /// Expect [`Response::Bool`].
    pub fn into_bool(self) -> NodeResult<bool> {
        match self {
            Response::Bool(value) => Ok(value),
            other => unexpected("bool", &other),
        }
    }

    /// Expect [`Response::Outcome`].
    pub fn into_outcome(self) -> NodeResult<u8> {
        match self {
            Response::Outcome(value) => Ok(value),
            other => unexpected("outcome", &other),
        }
    }

    /// Expect [`Response::Virtual`].
    pub fn into_virtual(self) -> NodeResult<VirtualId> {
        match self {
            Response::Virtual(value) => Ok(value),
            other => unexpected("virtual qubit", &other),
        }
    }

    /// Expect [`Response::Position`].
    pub fn into_position(self) -> NodeResult<RegisterPosition> {
        match self {
            Response::Position(value) => Ok(value),
            other => unexpected("position", &other),
        }
    }

    /// Expect [`Response::Register`].
    pub fn into_register(self) -> NodeResult<RegisterTransfer> {
        match self {
            Response::Register(value) => Ok(value),
            other => unexpected("register", &other),
        }
    }
}
