//! Statevector implementation of the engine contract.

use tracing::{debug, instrument};

use vqnet_engine::{Engine, EngineError, EngineResult, SingleQubitGate, StateBlob, TwoQubitGate};

use crate::statevector::Statevector;

/// Engine name stamped on serialized blobs.
pub const ENGINE_NAME: &str = "statevector";

/// Dense statevector engine.
///
/// Memory grows as 2^n in the number of active qubits, so registers backed
/// by this engine should stay around 20 qubits or fewer.
#[derive(Debug, Clone)]
pub struct StatevectorEngine {
    /// Current state of the active qubits.
    state: Statevector,
    /// Maximum number of qubits.
    capacity: usize,
}

impl StatevectorEngine {
    /// Create an empty engine.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Statevector::new(0),
            capacity,
        }
    }

    /// Read access to the underlying state.
    pub fn state(&self) -> &Statevector {
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
}

impl Engine for StatevectorEngine {
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
        self.state.apply_single(slot, gate);
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
        self.state.apply_two(control, target, gate);
        Ok(())
    }

    fn measure(&mut self, slot: usize, in_place: bool) -> EngineResult<u8> {
        self.check_slot(slot)?;
        let outcome = self.state.measure(slot);
        if !in_place {
            self.state.drop_qubit(slot, outcome);
        }
        Ok(outcome)
    }

    fn serialize(&self) -> StateBlob {
        StateBlob::new(
            ENGINE_NAME,
            self.state.num_qubits(),
            self.state.to_interleaved(),
        )
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
        let other = Statevector::from_interleaved(count, &blob.data).ok_or_else(|| {
            EngineError::Quantum(format!(
                "blob payload has {} values, expected {}",
                blob.data.len(),
                2usize << count
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

    fn bell_pair() -> StatevectorEngine {
        let mut engine = StatevectorEngine::new(2);
        engine.allocate_fresh().unwrap();
        engine.allocate_fresh().unwrap();
        engine.apply_single(0, SingleQubitGate::H).unwrap();
        engine.apply_two(0, 1, TwoQubitGate::Cnot).unwrap();
        engine
    }

    #[test]
    fn test_allocate_until_capacity() {
        let mut engine = StatevectorEngine::new(2);
        assert_eq!(engine.allocate_fresh().unwrap(), 0);
        assert_eq!(engine.allocate_fresh().unwrap(), 1);
        assert!(matches!(
            engine.allocate_fresh(),
            Err(EngineError::NoQubit(_))
        ));
        assert_eq!(engine.active_qubits(), 2);
    }

    #[test]
    fn test_bad_slot_is_quantum_error() {
        let mut engine = StatevectorEngine::new(2);
        engine.allocate_fresh().unwrap();
        assert!(matches!(
            engine.apply_single(1, SingleQubitGate::X),
            Err(EngineError::Quantum(_))
        ));
        assert!(matches!(
            engine.apply_two(0, 0, TwoQubitGate::Cnot),
            Err(EngineError::Quantum(_))
        ));
    }

    #[test]
    fn test_bell_outcomes_agree() {
        for _ in 0..20 {
            let mut engine = bell_pair();
            let a = engine.measure(0, false).unwrap();
            // Slot 1 shifted down to 0 after removal.
            let b = engine.measure(0, true).unwrap();
            assert_eq!(a, b);
            assert_eq!(engine.active_qubits(), 1);
        }
    }

    #[test]
    fn test_remove_shifts_later_slots() {
        let mut engine = StatevectorEngine::new(3);
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
    fn test_absorb_appends_after_own_qubits() {
        let mut first = StatevectorEngine::new(1);
        first.allocate_fresh().unwrap();

        let mut second = StatevectorEngine::new(1);
        second.allocate_fresh().unwrap();
        second.apply_single(0, SingleQubitGate::X).unwrap();

        first.raise_capacity(2);
        first.absorb(&second).unwrap();

        assert_eq!(first.active_qubits(), 2);
        assert_eq!(first.measure(0, true).unwrap(), 0);
        assert_eq!(first.measure(1, true).unwrap(), 1);
    }

    #[test]
    fn test_absorb_preserves_entanglement() {
        for _ in 0..20 {
            let mut host = StatevectorEngine::new(3);
            host.allocate_fresh().unwrap();
            let pair = bell_pair();
            host.absorb_parts(&pair.serialize(), 2).unwrap();

            let a = host.measure(1, true).unwrap();
            let b = host.measure(2, true).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_absorb_over_capacity_fails() {
        let mut host = StatevectorEngine::new(2);
        host.allocate_fresh().unwrap();
        let pair = bell_pair();
        assert!(matches!(
            host.absorb(&pair),
            Err(EngineError::Quantum(_))
        ));
        assert_eq!(host.active_qubits(), 1);
    }

    #[test]
    fn test_absorb_rejects_foreign_blob() {
        let mut host = StatevectorEngine::new(4);
        let blob = StateBlob::new("stabilizer", 1, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(host.absorb_parts(&blob, 1).is_err());

        let blob = StateBlob::new(ENGINE_NAME, 1, vec![1.0, 0.0]);
        assert!(host.absorb_parts(&blob, 1).is_err());
    }

    #[test]
    fn test_raise_capacity_never_shrinks() {
        let mut engine = StatevectorEngine::new(5);
        engine.raise_capacity(3);
        assert_eq!(engine.capacity(), 5);
        engine.raise_capacity(8);
        assert_eq!(engine.capacity(), 8);
    }
}
