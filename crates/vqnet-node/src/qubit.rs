//! Simulated and virtual qubit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ids::{AppId, QubitRef, RegisterId, SimId, VirtualId};
use crate::lock::AsyncLock;

/// A qubit simulated on this node.
///
/// Its position is not stored here; it is derived from the register's slot
/// order so it can never go stale.
#[derive(Debug, Clone)]
pub struct SimulatedQubit {
    /// Register holding the qubit's state.
    pub register: RegisterId,
    /// Fine-grained lock taken by gates on this qubit.
    pub lock: Arc<AsyncLock>,
}

impl SimulatedQubit {
    /// An unlocked qubit in `register`.
    pub fn new(register: RegisterId) -> Self {
        Self {
            register,
            lock: Arc::new(AsyncLock::new()),
        }
    }

    /// A qubit whose lock is already held by the caller.
    pub fn new_locked(register: RegisterId) -> Self {
        Self {
            register,
            lock: Arc::new(AsyncLock::new_locked()),
        }
    }
}

/// Lifecycle of a virtual qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualStatus {
    /// Delivered but not yet claimed by recv/recv_epr.
    Pending,
    /// Usable by its owner.
    Active,
}

/// Client-facing qubit handle on its virtual node.
#[derive(Debug, Clone)]
pub struct VirtualQubit {
    /// Where the state lives.
    pub sim: QubitRef,
    /// Session allowed to use the qubit.
    pub owner: AppId,
    /// Lifecycle state.
    pub status: VirtualStatus,
    /// Creation time on this node.
    pub created_at: DateTime<Utc>,
}

impl VirtualQubit {
    /// A new virtual qubit stamped with the current time.
    pub fn new(sim: QubitRef, owner: AppId, status: VirtualStatus) -> Self {
        Self {
            sim,
            owner,
            status,
            created_at: Utc::now(),
        }
    }

    /// Whether the owner may operate on it.
    pub fn is_active(&self) -> bool {
        self.status == VirtualStatus::Active
    }
}

/// Public description of a virtual qubit (get-time-info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QubitInfo {
    /// Handle on the virtual node.
    pub id: VirtualId,
    /// Owning session.
    pub owner: AppId,
    /// Creation time on the virtual node.
    pub created_at: DateTime<Utc>,
    /// Where the state lives.
    pub sim: QubitRef,
}

/// Where a simulated qubit sits inside its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPosition {
    /// Register holding the qubit.
    pub register: RegisterId,
    /// Slot inside the register.
    pub position: usize,
    /// Active qubits in the register.
    pub size: usize,
}

/// Full location of a virtual qubit's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QubitLocation {
    /// Simulating node.
    pub node: String,
    /// Simulated qubit id on that node.
    pub sim: SimId,
    /// Register id on that node.
    pub register: RegisterId,
    /// Slot inside the register.
    pub position: usize,
    /// Active qubits in the register.
    pub size: usize,
}

impl QubitLocation {
    /// Whether two qubits share one register.
    pub fn same_register(&self, other: &QubitLocation) -> bool {
        self.node == other.node && self.register == other.register
    }
}
