//! Simulating-node side: serving [`Request`]s.

use tracing::debug;

use super::Node;
use crate::error::NodeResult;
use crate::ids::{QubitRef, RegisterId, SimId};
use crate::protocol::{Request, Response};
use crate::state::NodeState;

impl Node {
    /// Serve one request from a peer or from this node itself.
    ///
    /// Requests that change register topology (`LockRegisters`,
    /// `MergeLocal`, `TakeRegister`, `CommitTakeRegister`, `ApplyTwo`)
    /// expect the caller to hold this node's global lock.
    pub async fn handle(&self, request: Request) -> NodeResult<Response> {
        match request {
            Request::Ping => Ok(Response::Unit),
            Request::IsLocked => Ok(Response::Bool(self.is_locked())),
            Request::TryAcquireGlobalLock => Ok(Response::Bool(self.try_acquire_global_lock())),
            Request::AcquireGlobalLock => {
                self.acquire_global_lock().await;
                Ok(Response::Unit)
            }
            Request::ReleaseGlobalLock => {
                self.release_global_lock();
                Ok(Response::Unit)
            }
            Request::LockRegisters { sims } => {
                self.lock_registers(&sims).await?;
                Ok(Response::Unit)
            }
            Request::UnlockRegisters { sims } => {
                self.unlock_registers(&sims);
                Ok(Response::Unit)
            }
            Request::ApplySingle { sim, gate } => {
                self.with_qubit_lock(sim, |state| state.apply_single(sim, gate))
                    .await?;
                Ok(Response::Unit)
            }
            Request::ApplyTwo {
                control,
                target,
                gate,
            } => {
                self.state().apply_two(control, target, gate)?;
                Ok(Response::Unit)
            }
            Request::Measure {
                sim,
                in_place: true,
            } => {
                let outcome = self
                    .with_qubit_lock(sim, |state| state.measure(sim, true))
                    .await?;
                Ok(Response::Outcome(outcome))
            }
            Request::Measure {
                sim,
                in_place: false,
            } => Ok(Response::Outcome(self.measure_removing(sim).await?)),
            Request::Reset { sim } => {
                self.with_qubit_lock(sim, |state| state.reset(sim)).await?;
                Ok(Response::Unit)
            }
            Request::Locate { sim } => Ok(Response::Position(self.state().locate(sim)?)),
            Request::MergeLocal { first, second } => {
                self.state().merge_local(first, second)?;
                Ok(Response::Unit)
            }
            Request::TakeRegister { sim } => {
                Ok(Response::Register(self.state().snapshot_register(sim)?))
            }
            Request::CommitTakeRegister { register } => {
                self.commit_take_register(register)?;
                Ok(Response::Unit)
            }
            Request::UpdateAfterMerge {
                new_node,
                old_node,
                moved,
            } => {
                let count = self.state().repoint(&new_node, &old_node, &moved);
                debug!(node = %self.name, %old_node, %new_node, count, "Repointed virtual qubits");
                Ok(Response::Unit)
            }
            Request::TransferQubit { sim, target, note } => Ok(Response::Virtual(
                self.transfer_out(sim, &target, note).await?,
            )),
            Request::AddQubit {
                sim_node,
                sim,
                note,
            } => {
                let (queue, to_app) = (note.queue, note.to_app);
                let id = self
                    .state()
                    .add_delivered(QubitRef::new(sim_node, sim), note)?;
                debug!(node = %self.name, ?queue, %to_app, qubit = %id, "Queued delivery");
                Ok(Response::Virtual(id))
            }
        }
    }

    /// Run `op` while holding the lock of one qubit.
    ///
    /// If the qubit moved away while we waited, `op` reports
    /// `NotSimulatedHere` and the caller re-routes.
    async fn with_qubit_lock<T>(
        &self,
        sim: SimId,
        op: impl FnOnce(&mut NodeState) -> NodeResult<T>,
    ) -> NodeResult<T> {
        let lock = self.state().qubit_lock(sim)?;
        let _guard = lock.lock().await;
        op(&mut self.state())
    }

    async fn lock_registers(&self, sims: &[SimId]) -> NodeResult<()> {
        let locks = self.state().register_locks(sims, true)?;
        for (_, lock) in &locks {
            lock.acquire().await;
        }
        debug!(node = %self.name, qubits = locks.len(), "Locked registers");
        Ok(())
    }

    fn unlock_registers(&self, sims: &[SimId]) {
        let locks = self.state().register_locks(sims, false).unwrap_or_default();
        for (_, lock) in &locks {
            lock.release();
        }
    }

    /// Measure and remove a qubit under this node's global lock.
    async fn measure_removing(&self, sim: SimId) -> NodeResult<u8> {
        self.global_lock.acquire().await;
        let result = self.measure_register_locked(sim).await;
        self.global_lock.release();
        result
    }

    async fn measure_register_locked(&self, sim: SimId) -> NodeResult<u8> {
        let locks = self.state().register_locks(&[sim], true)?;
        for (_, lock) in &locks {
            lock.acquire().await;
        }
        let result = self.state().measure(sim, false);
        for (_, lock) in &locks {
            lock.release();
        }
        result
    }

    fn commit_take_register(&self, register: RegisterId) -> NodeResult<()> {
        let locks = self.state().commit_take(register)?;
        // Waiters wake up, find the qubits gone and re-route.
        for lock in locks {
            lock.release();
        }
        Ok(())
    }
}
