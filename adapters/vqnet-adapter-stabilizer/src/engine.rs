//! Stabilizer implementation of the engine contract.

use tracing::{debug, instrument};

use vqnet_engine::{Engine, EngineError, EngineResult, SingleQubitGate, StateBlob, TwoQubitGate};

use crate::tableau::Tableau;

/// Engine name stamped on serialized blobs.
pub const ENGINE_NAME: &str = "stabilizer";

/// Rotation steps in a quarter turn.
const QUARTER_TURN: u8 = 64;

/// Stabilizer engine.
///
/// Only Clifford operations are available: every gate except `T` and
/// rotations by a multiple of a quarter turn. In exchange, memory grows as
/// n² instead of 2^n.
#[derive(Debug, Clone)]
pub struct StabilizerEngine {
    state: Tableau,
    capacity: usize,
}

impl StabilizerEngine {
    /// Create an empty engine.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Tableau::new(0),
            capacity,
        }
    }

    /// Read access to the underlying state.
    pub fn state(&self) -> &Tableau {
        &self.state
    }

    fn check_slot(&self, slot: usize) -> EngineResult<()> {
        if slot < self.state.num_qubits() {
            Ok(())
        } else {
            Err(EngineError::Quantum(format!(
                "slot {slot} out of range, engine holds {} qubits",
                self.state.num_qubits()
            )))
        }
    }

    fn rotate(&mut self, slot: usize, gate: SingleQubitGate, step: u8) -> EngineResult<()> {
        if step % QUARTER_TURN != 0 {
            return Err(EngineError::Unsupported(format!(
                "{gate} is not a Clifford rotation"
            )));
        }
        for _ in 0..step / QUARTER_TURN {
            match gate {
                SingleQubitGate::RotX(_) => {
                    self.state.apply_h(slot);
                    self.state.apply_s(slot);
                    self.state.apply_h(slot);
                }
                SingleQubitGate::RotY(_) => {
                    self.state.apply_h(slot);
                    self.state.apply_x(slot);
                }
                _ => self.state.apply_s(slot),
            }
        }
        Ok(())
    }
}

impl Engine for StabilizerEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn raise_capacity(&mut self, capacity: usize) {
        self.capacity = self.capacity.max(capacity);
    }

    fn active_qubits(&self) -> usize {
        self.state.num_qubits()
    }

    fn allocate_fresh(&mut self) -> EngineResult<usize> {
        let slot = self.state.num_qubits();
        if slot >= self.capacity {
            return Err(EngineError::NoQubit(format!(
                "engine is at capacity ({})",
                self.capacity
            )));
        }
        self.state.push_zero();
        Ok(slot)
    }

    fn remove(&mut self, slot: usize) -> EngineResult<()> {
        self.measure(slot, false).map(|_| ())
    }

    fn apply_single(&mut self, slot: usize, gate: SingleQubitGate) -> EngineResult<()> {
        self.check_slot(slot)?;
        match gate {
            SingleQubitGate::I => {}
            SingleQubitGate::X => self.state.apply_x(slot),
            SingleQubitGate::Y => self.state.apply_y(slot),
            SingleQubitGate::Z => self.state.apply_z(slot),
            SingleQubitGate::H => self.state.apply_h(slot),
            SingleQubitGate::K => self.state.apply_k(slot),
            SingleQubitGate::T => {
                return Err(EngineError::Unsupported(
                    "t is not a Clifford gate".to_string(),
                ));
            }
            SingleQubitGate::RotX(step)
            | SingleQubitGate::RotY(step)
            | SingleQubitGate::RotZ(step) => self.rotate(slot, gate, step)?,
        }
        Ok(())
    }

    fn apply_two(
        &mut self,
        control: usize,
        target: usize,
        gate: TwoQubitGate,
    ) -> EngineResult<()> {
        self.check_slot(control)?;
        self.check_slot(target)?;
        if control == target {
            return Err(EngineError::Quantum(format!(
                "{gate} needs two distinct slots, got {control} twice"
            )));
        }
        match gate {
            TwoQubitGate::Cnot => self.state.apply_cnot(control, target),
            TwoQubitGate::Cphase => self.state.apply_cz(control, target),
        }
        Ok(())
    }

    fn measure(&mut self, slot: usize, in_place: bool) -> EngineResult<u8> {
        self.check_slot(slot)?;
        let outcome = self.state.measure(slot).ok_or_else(|| {
            EngineError::Quantum(format!("generators do not fix slot {slot} after measuring"))
        })?;
        if !in_place && !self.state.drop_qubit(slot) {
            return Err(EngineError::Quantum(format!(
                "slot {slot} is still entangled after measuring"
            )));
        }
        Ok(outcome)
    }

    fn serialize(&self) -> StateBlob {
        StateBlob::new(ENGINE_NAME, self.state.num_qubits(), self.state.to_flat())
    }

    #[instrument(skip(self, blob))]
    fn absorb_parts(&mut self, blob: &StateBlob, count: usize) -> EngineResult<()> {
        if blob.engine != ENGINE_NAME {
            return Err(EngineError::Quantum(format!(
                "cannot absorb a {} blob into a {ENGINE_NAME} engine",
                blob.engine
            )));
        }
        if blob.num_qubits != count {
            return Err(EngineError::Quantum(format!(
                "blob holds {} qubits but {count} were announced",
                blob.num_qubits
            )));
        }
        let combined = self.state.num_qubits() + count;
        if combined > self.capacity {
            return Err(EngineError::Quantum(format!(
                "absorbing {count} qubits would exceed capacity {} ({combined} needed)",
                self.capacity
            )));
        }
        let other = Tableau::from_flat(count, &blob.data).ok_or_else(|| {
            EngineError::Quantum(format!(
                "blob payload of {} values is not a {count}-qubit tableau",
                blob.data.len()
            ))
        })?;
        self.state.tensor(&other);
        debug!("Absorbed {} qubits, now {}", count, combined);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vqnet_adapter_statevector::{Statevector, StatevectorEngine};

    fn bell_pair() -> StabilizerEngine {
        let mut engine = StabilizerEngine::new(2);
        engine.allocate_fresh().unwrap();
        engine.allocate_fresh().unwrap();
        engine.apply_single(0, SingleQubitGate::H).unwrap();
        engine.apply_two(0, 1, TwoQubitGate::Cnot).unwrap();
        engine
    }

    #[test]
    fn test_allocate_until_capacity() {
        let mut engine = StabilizerEngine::new(2);
        assert_eq!(engine.allocate_fresh().unwrap(), 0);
        assert_eq!(engine.allocate_fresh().unwrap(), 1);
        assert!(matches!(
            engine.allocate_fresh(),
            Err(EngineError::NoQubit(_))
        ));
    }

    #[test]
    fn test_non_clifford_gates_are_unsupported() {
        let mut engine = StabilizerEngine::new(1);
        engine.allocate_fresh().unwrap();
        assert!(matches!(
            engine.apply_single(0, SingleQubitGate::T),
            Err(EngineError::Unsupported(_))
        ));
        assert!(matches!(
            engine.apply_single(0, SingleQubitGate::RotX(10)),
            Err(EngineError::Unsupported(_))
        ));
        assert!(engine.apply_single(0, SingleQubitGate::RotX(128)).is_ok());
        assert_eq!(engine.measure(0, true).unwrap(), 1);
    }

    #[test]
    fn test_bell_outcomes_agree() {
        for _ in 0..20 {
            let mut engine = bell_pair();
            let a = engine.measure(0, false).unwrap();
            let b = engine.measure(0, true).unwrap();
            assert_eq!(a, b);
            assert_eq!(engine.active_qubits(), 1);
        }
    }

    #[test]
    fn test_remove_shifts_later_slots() {
        let mut engine = StabilizerEngine::new(3);
        for _ in 0..3 {
            engine.allocate_fresh().unwrap();
        }
        engine.apply_single(2, SingleQubitGate::X).unwrap();
        engine.remove(0).unwrap();

        assert_eq!(engine.active_qubits(), 2);
        assert_eq!(engine.measure(1, true).unwrap(), 1);
        assert_eq!(engine.measure(0, true).unwrap(), 0);
    }

    #[test]
    fn test_absorb_preserves_entanglement() {
        for _ in 0..20 {
            let mut host = StabilizerEngine::new(3);
            host.allocate_fresh().unwrap();
            host.absorb_parts(&bell_pair().serialize(), 2).unwrap();

            let a = host.measure(1, true).unwrap();
            let b = host.measure(2, true).unwrap();
            assert_eq!(a, b);
            assert_eq!(host.measure(0, true).unwrap(), 0);
        }
    }

    #[test]
    fn test_absorb_rejects_statevector_blob() {
        let mut host = StabilizerEngine::new(4);
        let blob = StateBlob::new("statevector", 1, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(host.absorb_parts(&blob, 1).is_err());
        let mut dense = StatevectorEngine::new(1);
        dense.allocate_fresh().unwrap();
        assert!(host.absorb(&dense).is_err());
        assert_eq!(host.active_qubits(), 0);
    }

    fn clifford_strategy() -> impl Strategy<Value = SingleQubitGate> {
        prop_oneof![
            Just(SingleQubitGate::X),
            Just(SingleQubitGate::Y),
            Just(SingleQubitGate::Z),
            Just(SingleQubitGate::H),
            Just(SingleQubitGate::K),
            (0u8..4).prop_map(|q| SingleQubitGate::RotX(q * QUARTER_TURN)),
            (0u8..4).prop_map(|q| SingleQubitGate::RotY(q * QUARTER_TURN)),
            (0u8..4).prop_map(|q| SingleQubitGate::RotZ(q * QUARTER_TURN)),
        ]
    }

    proptest! {
        // Whenever the dense state gives a certain outcome, the tableau must
        // report the same one, and uncertain outcomes must stay uncertain.
        #[test]
        fn agrees_with_statevector(
            ops in prop::collection::vec((0usize..3, clifford_strategy(), any::<bool>()), 0..30)
        ) {
            let mut engine = StabilizerEngine::new(3);
            for _ in 0..3 {
                engine.allocate_fresh().unwrap();
            }
            let mut dense = Statevector::new(3);
            for (qubit, gate, cphase) in ops {
                let other = (qubit + 1) % 3;
                let two = if cphase { TwoQubitGate::Cphase } else { TwoQubitGate::Cnot };
                engine.apply_single(qubit, gate).unwrap();
                engine.apply_two(qubit, other, two).unwrap();
                dense.apply_single(qubit, gate);
                dense.apply_two(qubit, other, two);
            }
            for qubit in 0..3 {
                let p = dense.probability_one(qubit);
                let expected = if p < 1e-9 {
                    Some(0)
                } else if p > 1.0 - 1e-9 {
                    Some(1)
                } else {
                    None
                };
                prop_assert_eq!(engine.state().deterministic_outcome(qubit), expected);
            }
        }
    }
}
