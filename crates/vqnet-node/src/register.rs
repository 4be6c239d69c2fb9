//! Registers: one engine plus the ordered list of qubits it simulates.
//!
//! A qubit's position in its register is its index in `slots`, which is
//! also its slot in the engine. Removing a qubit shifts every later qubit
//! down by one in both places, so positions stay dense.

use vqnet_engine::{Engine, EngineError, EngineResult, SingleQubitGate, StateBlob, TwoQubitGate};

use crate::ids::{RegisterId, SimId};

/// A register on its owning node.
#[derive(Debug)]
pub struct Register {
    id: RegisterId,
    engine: Box<dyn Engine>,
    slots: Vec<SimId>,
}

impl Register {
    /// Wrap an empty engine.
    pub fn new(id: RegisterId, engine: Box<dyn Engine>) -> Self {
        Self {
            id,
            engine,
            slots: Vec::new(),
        }
    }

    /// Register id.
    pub fn id(&self) -> RegisterId {
        self.id
    }

    /// Maximum number of qubits.
    pub fn capacity(&self) -> usize {
        self.engine.capacity()
    }

    /// Number of active qubits.
    pub fn active_qubits(&self) -> usize {
        self.slots.len()
    }

    /// Whether the register holds no qubits.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether another fresh qubit fits.
    pub fn has_room(&self) -> bool {
        self.slots.len() < self.engine.capacity()
    }

    /// Qubits in slot order.
    pub fn slots(&self) -> &[SimId] {
        &self.slots
    }

    /// Position of a qubit.
    pub fn position_of(&self, sim: SimId) -> Option<usize> {
        self.slots.iter().position(|&s| s == sim)
    }

    fn slot(&self, sim: SimId) -> EngineResult<usize> {
        self.position_of(sim).ok_or_else(|| {
            EngineError::Quantum(format!("{sim} is not part of register {}", self.id))
        })
    }

    /// Allocate a fresh `|0⟩` qubit for `sim`, returning its position.
    pub fn new_fresh_qubit(&mut self, sim: SimId) -> EngineResult<usize> {
        let slot = self.engine.allocate_fresh()?;
        self.slots.push(sim);
        debug_assert_eq!(slot + 1, self.slots.len());
        Ok(slot)
    }

    /// Remove a qubit, discarding its state.
    pub fn remove_qubit(&mut self, sim: SimId) -> EngineResult<()> {
        let slot = self.slot(sim)?;
        self.engine.remove(slot)?;
        self.slots.remove(slot);
        Ok(())
    }

    /// Apply a single-qubit gate.
    pub fn apply_single(&mut self, sim: SimId, gate: SingleQubitGate) -> EngineResult<()> {
        let slot = self.slot(sim)?;
        self.engine.apply_single(slot, gate)
    }

    /// Apply a two-qubit gate.
    pub fn apply_two(
        &mut self,
        control: SimId,
        target: SimId,
        gate: TwoQubitGate,
    ) -> EngineResult<()> {
        let control = self.slot(control)?;
        let target = self.slot(target)?;
        self.engine.apply_two(control, target, gate)
    }

    /// Measure a qubit. Without `in_place` the qubit is removed.
    pub fn measure(&mut self, sim: SimId, in_place: bool) -> EngineResult<u8> {
        let slot = self.slot(sim)?;
        let outcome = self.engine.measure(slot, in_place)?;
        if !in_place {
            self.slots.remove(slot);
        }
        Ok(outcome)
    }

    /// Absorb another register of the same node, consuming it.
    ///
    /// Capacity is raised to fit both.
    pub fn merge_from(&mut self, other: Register) -> EngineResult<()> {
        let combined = self.slots.len() + other.slots.len();
        self.engine.raise_capacity(combined);
        self.engine.absorb(other.engine.as_ref())?;
        self.slots.extend(other.slots);
        Ok(())
    }

    /// Absorb a register that arrived from another node.
    ///
    /// `sims` are the ids the absorbed qubits get here, in slot order.
    pub fn absorb_remote(&mut self, blob: &StateBlob, sims: &[SimId]) -> EngineResult<()> {
        let combined = self.slots.len() + sims.len();
        self.engine.raise_capacity(combined);
        self.engine.absorb_parts(blob, sims.len())?;
        self.slots.extend_from_slice(sims);
        Ok(())
    }

    /// Serialized state and qubit order, leaving the register as it is.
    pub fn snapshot(&self) -> (StateBlob, Vec<SimId>) {
        (self.engine.serialize(), self.slots.clone())
    }
}
