//! Engine trait and the transferable state blob.
//!
//! # Contract
//!
//! An [`Engine`] is a quantum state container bound to one register. Its
//! qubits are addressed by dense slot indices `0..active_qubits()`.
//!
//! ```text
//!   allocate_fresh() ──→ apply_single()/apply_two() ──→ measure()
//!         │                                               │
//!         └──── serialize() ──→ absorb_parts() ◀──────────┘ (remove)
//! ```
//!
//! - `allocate_fresh()` appends a `|0⟩` qubit at slot `active_qubits()` and
//!   fails with [`EngineError::NoQubit`] once `capacity()` is reached.
//! - `remove(slot)` and `measure(slot, false)` shift every later slot down
//!   by one.
//! - `absorb*()` appends the other state's qubits after this engine's own,
//!   preserving the order of both. The caller raises capacity first; the
//!   engine never grows on its own.
//!
//! ## Method table
//!
//! | Method | Fails with |
//! |--------|------------|
//! | `allocate_fresh()` | `NoQubit` at capacity |
//! | `remove()` | `Quantum` on a bad slot |
//! | `apply_single()` / `apply_two()` | `Quantum` on a bad slot |
//! | `measure()` | `Quantum` on a bad slot |
//! | `absorb_parts()` | `Quantum` on capacity overflow or a foreign blob |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineResult;
use crate::gate::{SingleQubitGate, TwoQubitGate};

/// Serialized engine state, as sent between nodes during a merge.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBlob {
    /// Name of the engine that produced the blob.
    pub engine: String,
    /// Number of qubits encoded in `data`.
    pub num_qubits: usize,
    /// Engine-specific payload.
    pub data: Vec<f64>,
}

impl StateBlob {
    /// Create a blob.
    pub fn new(engine: impl Into<String>, num_qubits: usize, data: Vec<f64>) -> Self {
        Self {
            engine: engine.into(),
            num_qubits,
            data,
        }
    }
}

// Payloads grow as 2^n, keep them out of logs.
impl fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBlob")
            .field("engine", &self.engine)
            .field("num_qubits", &self.num_qubits)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A swappable quantum state container.
///
/// Engines are driven synchronously by their owning register, which is
/// itself guarded by the node's bookkeeping mutex, so the trait only
/// requires `Send`.
pub trait Engine: Send {
    /// Short engine name, also stamped on serialized blobs.
    fn name(&self) -> &str;

    /// Maximum number of qubits this engine may hold.
    fn capacity(&self) -> usize;

    /// Raise the capacity. Requests below the current capacity are ignored.
    fn raise_capacity(&mut self, capacity: usize);

    /// Number of qubits currently held.
    fn active_qubits(&self) -> usize;

    /// Append a fresh `|0⟩` qubit and return its slot.
    fn allocate_fresh(&mut self) -> EngineResult<usize>;

    /// Remove a qubit, shifting later slots down.
    fn remove(&mut self, slot: usize) -> EngineResult<()>;

    /// Apply a single-qubit gate.
    fn apply_single(&mut self, slot: usize, gate: SingleQubitGate) -> EngineResult<()>;

    /// Apply a two-qubit gate, `control` first.
    fn apply_two(&mut self, control: usize, target: usize, gate: TwoQubitGate)
    -> EngineResult<()>;

    /// Measure in the computational basis.
    ///
    /// With `in_place` the qubit stays allocated in its collapsed state,
    /// otherwise it is removed.
    fn measure(&mut self, slot: usize, in_place: bool) -> EngineResult<u8>;

    /// Snapshot the full state.
    fn serialize(&self) -> StateBlob;

    /// Append `count` qubits described by `blob` after the current ones.
    fn absorb_parts(&mut self, blob: &StateBlob, count: usize) -> EngineResult<()>;

    /// Append every qubit of a live engine after the current ones.
    fn absorb(&mut self, other: &dyn Engine) -> EngineResult<()> {
        self.absorb_parts(&other.serialize(), other.active_qubits())
    }
}

impl fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name())
            .field("active_qubits", &self.active_qubits())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_debug_hides_payload() {
        let blob = StateBlob::new("statevector", 1, vec![1.0, 0.0, 0.0, 0.0]);
        let rendered = format!("{blob:?}");
        assert!(rendered.contains("data_len: 4"));
        assert!(!rendered.contains("1.0"));
    }

    #[test]
    fn test_blob_serde() {
        let blob = StateBlob::new("statevector", 0, vec![1.0, 0.0]);
        let json = serde_json::to_string(&blob).unwrap();
        let back: StateBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
    }
}
