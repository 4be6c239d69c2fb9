//! Bookkeeping owned by one node.
//!
//! Everything here is synchronous and lives behind the node's state mutex.
//! Callers never hold that mutex across an await point; protocol-level
//! exclusion comes from the global and per-qubit [`AsyncLock`]s instead.

use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use vqnet_adapter_stabilizer::StabilizerEngine;
use vqnet_adapter_statevector::StatevectorEngine;
use vqnet_engine::{Engine, SingleQubitGate, TwoQubitGate};

use crate::config::{EngineKind, NodeSettings};
use crate::error::{NodeError, NodeResult};
use crate::ids::{AppId, QubitRef, RegisterId, SimId, VirtualId};
use crate::lock::AsyncLock;
use crate::protocol::{DeliveryNote, DeliveryQueue, PendingDelivery, RegisterTransfer};
use crate::qubit::{RegisterPosition, SimulatedQubit, VirtualQubit, VirtualStatus};
use crate::register::Register;

/// Build an empty engine of the configured kind.
pub fn new_engine(kind: EngineKind, capacity: usize) -> Box<dyn Engine> {
    match kind {
        EngineKind::Statevector => Box::new(StatevectorEngine::new(capacity)),
        EngineKind::Stabilizer => Box::new(StabilizerEngine::new(capacity)),
    }
}

/// Mutable state of a node.
#[derive(Debug)]
pub struct NodeState {
    name: String,
    engine: EngineKind,
    register_capacity: usize,
    max_registers: usize,
    max_qubits: usize,

    registers: FxHashMap<RegisterId, Register>,
    simulated: FxHashMap<SimId, SimulatedQubit>,
    virtuals: FxHashMap<VirtualId, VirtualQubit>,
    /// Register that receives fresh allocations while it has room.
    alloc_register: Option<RegisterId>,

    next_register: u64,
    next_sim: u64,
    next_virtual: u32,

    queues: FxHashMap<(DeliveryQueue, AppId), VecDeque<PendingDelivery>>,
    entanglement_ids: FxHashMap<(AppId, String, AppId), u32>,
}

impl NodeState {
    /// Empty state for node `name`.
    pub fn new(name: &str, settings: &NodeSettings) -> Self {
        Self {
            name: name.to_string(),
            engine: settings.engine,
            register_capacity: settings.register_capacity,
            max_registers: settings.max_registers,
            max_qubits: settings.max_qubits,
            registers: FxHashMap::default(),
            simulated: FxHashMap::default(),
            virtuals: FxHashMap::default(),
            alloc_register: None,
            next_register: 0,
            next_sim: 0,
            next_virtual: 0,
            queues: FxHashMap::default(),
            entanglement_ids: FxHashMap::default(),
        }
    }

    fn not_here(&self, sim: SimId) -> NodeError {
        NodeError::NotSimulatedHere(format!("{sim} is not simulated on {}", self.name))
    }

    // =========================================================================
    // Registers and simulated qubits
    // =========================================================================

    /// Create an empty register.
    pub fn new_register(&mut self) -> NodeResult<RegisterId> {
        if self.registers.len() >= self.max_registers {
            return Err(NodeError::NoQubit(format!(
                "{} already holds the maximum of {} registers",
                self.name, self.max_registers
            )));
        }
        let id = RegisterId(self.next_register);
        self.next_register += 1;
        let engine = new_engine(self.engine, self.register_capacity);
        self.registers.insert(id, Register::new(id, engine));
        debug!(node = %self.name, register = %id, "Created register");
        Ok(id)
    }

    fn allocation_target(&mut self) -> NodeResult<RegisterId> {
        if let Some(id) = self.alloc_register {
            if self.registers.get(&id).is_some_and(Register::has_room) {
                return Ok(id);
            }
        }
        let id = self.new_register()?;
        self.alloc_register = Some(id);
        Ok(id)
    }

    fn allocate_simulated(&mut self) -> NodeResult<SimId> {
        let register_id = self.allocation_target()?;
        let sim = SimId(self.next_sim);
        let register = self
            .registers
            .get_mut(&register_id)
            .ok_or_else(|| NodeError::Quantum(format!("register {register_id} vanished")))?;
        register.new_fresh_qubit(sim)?;
        self.next_sim += 1;
        self.simulated.insert(sim, SimulatedQubit::new(register_id));
        Ok(sim)
    }

    /// Allocate a fresh qubit simulated and owned here.
    ///
    /// Limits are checked before anything changes.
    pub fn allocate_local(&mut self, owner: AppId, ignore_limit: bool) -> NodeResult<VirtualId> {
        self.check_virtual_limit(ignore_limit)?;
        let sim = self.allocate_simulated()?;
        let sim = QubitRef::new(self.name.clone(), sim);
        Ok(self.insert_virtual(sim, owner, VirtualStatus::Active))
    }

    /// Lock of a simulated qubit.
    pub fn qubit_lock(&self, sim: SimId) -> NodeResult<Arc<AsyncLock>> {
        self.simulated
            .get(&sim)
            .map(|q| Arc::clone(&q.lock))
            .ok_or_else(|| self.not_here(sim))
    }

    /// Whether a qubit is simulated here.
    pub fn is_simulated(&self, sim: SimId) -> bool {
        self.simulated.contains_key(&sim)
    }

    fn register_id(&self, sim: SimId) -> NodeResult<RegisterId> {
        self.simulated
            .get(&sim)
            .map(|q| q.register)
            .ok_or_else(|| self.not_here(sim))
    }

    fn register_mut(&mut self, sim: SimId) -> NodeResult<&mut Register> {
        let id = self.register_id(sim)?;
        self.registers
            .get_mut(&id)
            .ok_or_else(|| NodeError::Quantum(format!("{sim} points at missing register {id}")))
    }

    /// Locks of every qubit in the registers holding `sims`, in id order.
    ///
    /// With `strict`, a qubit that is not simulated here is an error;
    /// otherwise it is skipped.
    pub fn register_locks(
        &self,
        sims: &[SimId],
        strict: bool,
    ) -> NodeResult<Vec<(SimId, Arc<AsyncLock>)>> {
        let mut locks = BTreeMap::new();
        for &sim in sims {
            let register = match self.register_id(sim) {
                Ok(id) => id,
                Err(err) if strict => return Err(err),
                Err(_) => continue,
            };
            let Some(register) = self.registers.get(&register) else {
                continue;
            };
            for member in register.slots() {
                if let Some(qubit) = self.simulated.get(member) {
                    locks.insert(*member, Arc::clone(&qubit.lock));
                }
            }
        }
        Ok(locks.into_iter().collect())
    }

    /// Apply a single-qubit gate.
    pub fn apply_single(&mut self, sim: SimId, gate: SingleQubitGate) -> NodeResult<()> {
        Ok(self.register_mut(sim)?.apply_single(sim, gate)?)
    }

    /// Apply a two-qubit gate to qubits of one register.
    pub fn apply_two(
        &mut self,
        control: SimId,
        target: SimId,
        gate: TwoQubitGate,
    ) -> NodeResult<()> {
        let control_reg = self.register_id(control)?;
        let target_reg = self.register_id(target)?;
        if control_reg != target_reg {
            return Err(NodeError::Quantum(format!(
                "{control} and {target} are in different registers ({control_reg}, {target_reg})"
            )));
        }
        Ok(self.register_mut(control)?.apply_two(control, target, gate)?)
    }

    /// Measure a qubit.
    ///
    /// Without `in_place` the qubit is removed and its register is deleted if
    /// it became empty.
    pub fn measure(&mut self, sim: SimId, in_place: bool) -> NodeResult<u8> {
        let register_id = self.register_id(sim)?;
        let outcome = self.register_mut(sim)?.measure(sim, in_place)?;
        if !in_place {
            self.simulated.remove(&sim);
            self.drop_register_if_empty(register_id);
        }
        Ok(outcome)
    }

    /// Measure in place and rotate back to `|0⟩`.
    pub fn reset(&mut self, sim: SimId) -> NodeResult<()> {
        let register = self.register_mut(sim)?;
        if register.measure(sim, true)? == 1 {
            register.apply_single(sim, SingleQubitGate::X)?;
        }
        Ok(())
    }

    /// Register and slot of a qubit.
    pub fn locate(&self, sim: SimId) -> NodeResult<RegisterPosition> {
        let register_id = self.register_id(sim)?;
        let register = self
            .registers
            .get(&register_id)
            .ok_or_else(|| NodeError::Quantum(format!("register {register_id} vanished")))?;
        let position = register.position_of(sim).ok_or_else(|| {
            NodeError::Quantum(format!("{sim} is missing from register {register_id}"))
        })?;
        Ok(RegisterPosition {
            register: register_id,
            position,
            size: register.active_qubits(),
        })
    }

    fn drop_register_if_empty(&mut self, id: RegisterId) {
        if self.registers.get(&id).is_some_and(Register::is_empty) {
            self.registers.remove(&id);
            debug!(node = %self.name, register = %id, "Deleted empty register");
        }
    }

    /// Merge the register of `second` into the register of `first`.
    ///
    /// A no-op when both already share a register.
    pub fn merge_local(&mut self, first: SimId, second: SimId) -> NodeResult<RegisterId> {
        let keep = self.register_id(first)?;
        let absorb = self.register_id(second)?;
        if keep == absorb {
            return Ok(keep);
        }
        let other = self
            .registers
            .remove(&absorb)
            .ok_or_else(|| NodeError::Quantum(format!("register {absorb} vanished")))?;
        let moved = other.slots().to_vec();
        let register = self
            .registers
            .get_mut(&keep)
            .ok_or_else(|| NodeError::Quantum(format!("register {keep} vanished")))?;
        register.merge_from(other)?;
        for sim in moved {
            if let Some(qubit) = self.simulated.get_mut(&sim) {
                qubit.register = keep;
            }
        }
        debug!(node = %self.name, from = %absorb, into = %keep, "Merged registers locally");
        Ok(keep)
    }

    /// Register holding `sim`.
    pub fn register_of(&self, sim: SimId) -> NodeResult<RegisterId> {
        self.register_id(sim)
    }

    /// Copy out the register holding `sim` for hand-off to another node.
    ///
    /// The register stays here until [`NodeState::commit_take`] confirms the
    /// new owner absorbed it.
    pub fn snapshot_register(&self, sim: SimId) -> NodeResult<RegisterTransfer> {
        let id = self.register_id(sim)?;
        let register = self
            .registers
            .get(&id)
            .ok_or_else(|| NodeError::Quantum(format!("register {id} vanished")))?;
        let (blob, slots) = register.snapshot();
        Ok(RegisterTransfer {
            register: id,
            blob,
            slots,
        })
    }

    /// Delete a handed-off register and its qubits.
    ///
    /// Returns the locks of the removed qubits, which the caller releases so
    /// waiters notice the qubits left.
    pub fn commit_take(&mut self, id: RegisterId) -> NodeResult<Vec<Arc<AsyncLock>>> {
        let register = self.registers.remove(&id).ok_or_else(|| {
            NodeError::NotSimulatedHere(format!("register {id} is not on {}", self.name))
        })?;
        let locks = register
            .slots()
            .iter()
            .filter_map(|s| self.simulated.remove(s))
            .map(|q| q.lock)
            .collect();
        debug!(node = %self.name, register = %id, qubits = register.active_qubits(),
            "Handed off register");
        Ok(locks)
    }

    /// Absorb a handed-off register into `into`.
    ///
    /// The absorbed qubits get fresh ids here and start out locked, since
    /// the merging protocol already owns them. Returns `(old, new)` id pairs.
    pub fn absorb_transfer(
        &mut self,
        into: RegisterId,
        transfer: &RegisterTransfer,
    ) -> NodeResult<Vec<(SimId, SimId)>> {
        let first = self.next_sim;
        let new_ids: Vec<SimId> = (0..transfer.slots.len() as u64)
            .map(|k| SimId(first + k))
            .collect();
        let register = self
            .registers
            .get_mut(&into)
            .ok_or_else(|| NodeError::Quantum(format!("register {into} vanished")))?;
        register.absorb_remote(&transfer.blob, &new_ids)?;
        self.next_sim += new_ids.len() as u64;
        for &sim in &new_ids {
            self.simulated.insert(sim, SimulatedQubit::new_locked(into));
        }
        Ok(transfer.slots.iter().copied().zip(new_ids).collect())
    }

    /// Undo [`NodeState::absorb_transfer`] after its hand-off fell through.
    ///
    /// The absorbed qubits form their own tensor factor, so removing them
    /// leaves the rest of `into` untouched.
    pub fn drop_absorbed(&mut self, into: RegisterId, moved: &[(SimId, SimId)]) -> NodeResult<()> {
        let register = self
            .registers
            .get_mut(&into)
            .ok_or_else(|| NodeError::Quantum(format!("register {into} vanished")))?;
        for &(_, sim) in moved {
            register.remove_qubit(sim)?;
            self.simulated.remove(&sim);
        }
        self.drop_register_if_empty(into);
        Ok(())
    }

    /// Delete a register if nothing ended up in it.
    pub fn discard_if_empty(&mut self, id: RegisterId) {
        self.drop_register_if_empty(id);
    }

    // =========================================================================
    // Virtual qubits
    // =========================================================================

    fn check_virtual_limit(&self, ignore_limit: bool) -> NodeResult<()> {
        if !ignore_limit && self.virtuals.len() >= self.max_qubits {
            return Err(NodeError::NoQubit(format!(
                "{} already holds the maximum of {} qubits",
                self.name, self.max_qubits
            )));
        }
        Ok(())
    }

    fn insert_virtual(&mut self, sim: QubitRef, owner: AppId, status: VirtualStatus) -> VirtualId {
        let id = VirtualId(self.next_virtual);
        self.next_virtual += 1;
        self.virtuals.insert(id, VirtualQubit::new(sim, owner, status));
        id
    }

    /// Create a pending virtual qubit for a delivered state and queue it.
    ///
    /// Either both happen or, at the virtual-qubit limit, neither does.
    pub fn add_delivered(&mut self, sim: QubitRef, note: DeliveryNote) -> NodeResult<VirtualId> {
        self.check_virtual_limit(false)?;
        let id = self.insert_virtual(sim, note.to_app, VirtualStatus::Pending);
        let queue = note.queue;
        self.push_delivery(queue, note.into_delivery(id));
        Ok(id)
    }

    /// An active virtual qubit.
    pub fn active_virtual(&self, id: VirtualId) -> NodeResult<&VirtualQubit> {
        self.virtuals
            .get(&id)
            .filter(|q| q.is_active())
            .ok_or_else(|| NodeError::QubitNotActive(format!("{id} on {}", self.name)))
    }

    /// Any virtual qubit, pending or active.
    pub fn virtual_qubit(&self, id: VirtualId) -> Option<&VirtualQubit> {
        self.virtuals.get(&id)
    }

    /// Forget a virtual qubit.
    pub fn remove_virtual(&mut self, id: VirtualId) -> Option<VirtualQubit> {
        self.virtuals.remove(&id)
    }

    /// Make a pending virtual qubit usable.
    pub fn activate(&mut self, id: VirtualId) -> NodeResult<()> {
        let qubit = self.virtuals.get_mut(&id).ok_or_else(|| {
            NodeError::Quantum(format!("delivered qubit {id} is missing on {}", self.name))
        })?;
        qubit.status = VirtualStatus::Active;
        Ok(())
    }

    /// Repoint virtual qubits whose state moved from `old_node` to `new_node`.
    pub fn repoint(&mut self, new_node: &str, old_node: &str, moved: &[(SimId, SimId)]) -> usize {
        let moved: FxHashMap<SimId, SimId> = moved.iter().copied().collect();
        let mut count = 0;
        for qubit in self.virtuals.values_mut() {
            if qubit.sim.node != old_node {
                continue;
            }
            if let Some(&new_sim) = moved.get(&qubit.sim.sim) {
                qubit.sim = QubitRef::new(new_node, new_sim);
                count += 1;
            }
        }
        count
    }

    // =========================================================================
    // Pending deliveries and entanglement ids
    // =========================================================================

    /// Queue a delivery for its receiving application.
    fn push_delivery(&mut self, queue: DeliveryQueue, delivery: PendingDelivery) {
        self.queues
            .entry((queue, delivery.to_app))
            .or_default()
            .push_back(delivery);
    }

    /// Oldest delivery for `app`, if any.
    pub fn pop_delivery(&mut self, queue: DeliveryQueue, app: AppId) -> Option<PendingDelivery> {
        self.queues.get_mut(&(queue, app))?.pop_front()
    }

    /// Next pair id for `(app, remote_node, remote_app)`, starting at 0.
    pub fn next_entanglement_id(&mut self, app: AppId, remote_node: &str, remote_app: AppId) -> u32 {
        let counter = self
            .entanglement_ids
            .entry((app, remote_node.to_string(), remote_app))
            .or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of registers.
    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Number of simulated qubits.
    pub fn simulated_count(&self) -> usize {
        self.simulated.len()
    }

    /// Number of virtual qubits, pending included.
    pub fn virtual_count(&self) -> usize {
        self.virtuals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: usize, max_registers: usize, max_qubits: usize) -> NodeSettings {
        NodeSettings {
            register_capacity: capacity,
            max_registers,
            max_qubits,
            ..NodeSettings::default()
        }
    }

    fn sim_of(state: &NodeState, id: VirtualId) -> SimId {
        state.active_virtual(id).unwrap().sim.sim
    }

    #[test]
    fn test_allocation_fills_register_then_opens_new() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        let a = state.allocate_local(AppId(1), false).unwrap();
        let b = state.allocate_local(AppId(1), false).unwrap();
        let c = state.allocate_local(AppId(1), false).unwrap();

        assert_eq!(state.register_count(), 2);
        let reg_a = state.register_of(sim_of(&state, a)).unwrap();
        assert_eq!(reg_a, state.register_of(sim_of(&state, b)).unwrap());
        assert_ne!(reg_a, state.register_of(sim_of(&state, c)).unwrap());
    }

    #[test]
    fn test_register_limit_is_no_qubit() {
        let mut state = NodeState::new("Alice", &settings(1, 1, 20));
        state.allocate_local(AppId(1), false).unwrap();
        assert!(matches!(
            state.allocate_local(AppId(1), false),
            Err(NodeError::NoQubit(_))
        ));
        assert_eq!(state.virtual_count(), 1);
        assert_eq!(state.simulated_count(), 1);
    }

    #[test]
    fn test_virtual_limit_is_no_qubit_unless_ignored() {
        let mut state = NodeState::new("Alice", &settings(10, 10, 1));
        state.allocate_local(AppId(1), false).unwrap();
        assert!(matches!(
            state.allocate_local(AppId(1), false),
            Err(NodeError::NoQubit(_))
        ));
        assert!(state.allocate_local(AppId(1), true).is_ok());
    }

    #[test]
    fn test_measure_removal_deletes_empty_register() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        let q = state.allocate_local(AppId(1), false).unwrap();
        let sim = sim_of(&state, q);

        assert_eq!(state.measure(sim, false).unwrap(), 0);
        assert_eq!(state.register_count(), 0);
        assert!(!state.is_simulated(sim));
    }

    #[test]
    fn test_merge_local_is_noop_for_same_register() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        let a = alloc_sim(&mut state);
        let b = alloc_sim(&mut state);
        let before = state.locate(b).unwrap();

        let merged = state.merge_local(a, b).unwrap();
        assert_eq!(merged, before.register);
        assert_eq!(state.locate(b).unwrap(), before);
    }

    #[test]
    fn test_merge_local_joins_registers() {
        let mut state = NodeState::new("Alice", &settings(1, 10, 20));
        let a = alloc_sim(&mut state);
        let b = alloc_sim(&mut state);
        assert_eq!(state.register_count(), 2);

        state.merge_local(a, b).unwrap();
        assert_eq!(state.register_count(), 1);
        assert_eq!(state.locate(b).unwrap().position, 1);
        assert!(state.apply_two(a, b, TwoQubitGate::Cnot).is_ok());
    }

    #[test]
    fn test_take_register_keeps_state_until_commit() {
        let mut source = NodeState::new("Bob", &settings(2, 10, 20));
        let q = state_alloc(&mut source);
        let old_sim = sim_of(&source, q);
        source.apply_single(old_sim, SingleQubitGate::X).unwrap();

        let transfer = source.snapshot_register(old_sim).unwrap();
        assert_eq!(source.register_count(), 1);
        assert!(source.is_simulated(old_sim));

        let mut host = NodeState::new("Alice", &settings(2, 10, 20));
        let into = host.new_register().unwrap();
        let moved = host.absorb_transfer(into, &transfer).unwrap();
        assert_eq!(moved.len(), 1);
        let (_, new_sim) = moved[0];
        assert!(host.qubit_lock(new_sim).unwrap().is_locked());
        assert_eq!(host.measure(new_sim, true).unwrap(), 1);

        let locks = source.commit_take(transfer.register).unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(source.register_count(), 0);
        assert!(!source.is_simulated(old_sim));
        assert!(matches!(
            source.commit_take(transfer.register),
            Err(NodeError::NotSimulatedHere(_))
        ));
    }

    #[test]
    fn test_drop_absorbed_restores_host_register() {
        let mut source = NodeState::new("Bob", &settings(2, 10, 20));
        let remote = alloc_sim(&mut source);
        source.apply_single(remote, SingleQubitGate::H).unwrap();
        let transfer = source.snapshot_register(remote).unwrap();

        let mut host = NodeState::new("Alice", &settings(2, 10, 20));
        let local = alloc_sim(&mut host);
        host.apply_single(local, SingleQubitGate::X).unwrap();
        let into = host.register_of(local).unwrap();
        let moved = host.absorb_transfer(into, &transfer).unwrap();
        assert_eq!(host.simulated_count(), 2);

        host.drop_absorbed(into, &moved).unwrap();
        assert_eq!(host.simulated_count(), 1);
        assert_eq!(host.locate(local).unwrap().size, 1);
        assert_eq!(host.measure(local, true).unwrap(), 1);
        assert!(source.is_simulated(remote));
    }

    #[test]
    fn test_drop_absorbed_deletes_fresh_register() {
        let mut source = NodeState::new("Bob", &settings(2, 10, 20));
        let remote = alloc_sim(&mut source);
        let transfer = source.snapshot_register(remote).unwrap();

        let mut host = NodeState::new("Alice", &settings(2, 10, 20));
        let into = host.new_register().unwrap();
        let moved = host.absorb_transfer(into, &transfer).unwrap();
        host.drop_absorbed(into, &moved).unwrap();
        assert_eq!(host.register_count(), 0);
        assert_eq!(host.simulated_count(), 0);
    }

    #[test]
    fn test_add_delivered_queues_pending_qubit() {
        let mut state = NodeState::new("Bob", &settings(2, 10, 1));
        let q = state
            .add_delivered(QubitRef::new("Alice", SimId(4)), note(DeliveryQueue::Epr, 2))
            .unwrap();
        assert!(state.active_virtual(q).is_err());
        let delivery = state.pop_delivery(DeliveryQueue::Epr, AppId(2)).unwrap();
        assert_eq!(delivery.qubit, q);
        assert_eq!(state.virtual_qubit(q).unwrap().owner, AppId(2));

        // At the limit neither the qubit nor the queue entry appears.
        assert!(matches!(
            state.add_delivered(QubitRef::new("Alice", SimId(5)), note(DeliveryQueue::Plain, 2)),
            Err(NodeError::NoQubit(_))
        ));
        assert_eq!(state.virtual_count(), 1);
        assert!(state.pop_delivery(DeliveryQueue::Plain, AppId(2)).is_none());
    }

    #[test]
    fn test_repoint_only_matching_node() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        let remote = pending(&mut state, QubitRef::new("Bob", SimId(3)));
        let other = pending(&mut state, QubitRef::new("Charlie", SimId(3)));

        let count = state.repoint("Alice", "Bob", &[(SimId(3), SimId(11))]);
        assert_eq!(count, 1);
        assert_eq!(
            state.virtual_qubit(remote).unwrap().sim,
            QubitRef::new("Alice", SimId(11))
        );
        assert_eq!(
            state.virtual_qubit(other).unwrap().sim,
            QubitRef::new("Charlie", SimId(3))
        );
    }

    #[test]
    fn test_pending_is_not_active() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        let q = pending(&mut state, QubitRef::new("Bob", SimId(0)));
        assert!(matches!(
            state.active_virtual(q),
            Err(NodeError::QubitNotActive(_))
        ));
        state.activate(q).unwrap();
        assert!(state.active_virtual(q).is_ok());
    }

    #[test]
    fn test_delivery_queues_are_fifo_per_app() {
        let mut state = NodeState::new("Bob", &settings(2, 10, 20));
        for (n, app) in [(0, 1), (1, 2), (2, 1)] {
            state.push_delivery(
                DeliveryQueue::Plain,
                PendingDelivery {
                    from_node: "Alice".into(),
                    from_app: AppId(9),
                    to_app: AppId(app),
                    qubit: VirtualId(n),
                    entanglement: None,
                },
            );
        }
        let pop = |state: &mut NodeState, app| {
            state
                .pop_delivery(DeliveryQueue::Plain, AppId(app))
                .map(|d| d.qubit)
        };
        assert_eq!(pop(&mut state, 1), Some(VirtualId(0)));
        assert_eq!(pop(&mut state, 1), Some(VirtualId(2)));
        assert_eq!(pop(&mut state, 1), None);
        assert_eq!(pop(&mut state, 2), Some(VirtualId(1)));
        assert!(state.pop_delivery(DeliveryQueue::Epr, AppId(2)).is_none());
    }

    #[test]
    fn test_entanglement_ids_count_per_triple() {
        let mut state = NodeState::new("Alice", &settings(2, 10, 20));
        assert_eq!(state.next_entanglement_id(AppId(1), "Bob", AppId(2)), 0);
        assert_eq!(state.next_entanglement_id(AppId(1), "Bob", AppId(2)), 1);
        assert_eq!(state.next_entanglement_id(AppId(1), "Bob", AppId(3)), 0);
    }

    #[test]
    fn test_register_locks_cover_whole_register() {
        let mut state = NodeState::new("Alice", &settings(3, 10, 20));
        let a = alloc_sim(&mut state);
        let _b = state_alloc(&mut state);
        let locks = state.register_locks(&[a], true).unwrap();
        assert_eq!(locks.len(), 2);

        assert!(state.register_locks(&[SimId(99)], true).is_err());
        assert!(state.register_locks(&[SimId(99)], false).unwrap().is_empty());
    }

    fn state_alloc(state: &mut NodeState) -> VirtualId {
        state.allocate_local(AppId(1), false).unwrap()
    }

    fn alloc_sim(state: &mut NodeState) -> SimId {
        let id = state_alloc(state);
        sim_of(state, id)
    }

    fn note(queue: DeliveryQueue, to_app: u16) -> DeliveryNote {
        DeliveryNote {
            queue,
            from_node: "Alice".into(),
            from_app: AppId(1),
            to_app: AppId(to_app),
            entanglement: None,
        }
    }

    fn pending(state: &mut NodeState, sim: QubitRef) -> VirtualId {
        state.add_delivered(sim, note(DeliveryQueue::Plain, 1)).unwrap()
    }
}
