//! Virtual-node side: single-qubit operations on [`VirtualId`]s.

use tracing::{debug, error, instrument, warn};

use vqnet_engine::{Axis, SingleQubitGate};

use super::Node;
use crate::error::{NodeError, NodeResult};
use crate::ids::{AppId, QubitRef, SimId, VirtualId};
use crate::protocol::{Request, Response};
use crate::qubit::{QubitInfo, QubitLocation};

impl Node {
    /// Allocate a fresh `|0⟩` qubit for `app`.
    ///
    /// Fails with [`NodeError::NoQubit`] at the virtual-qubit or register
    /// limit, leaving nothing allocated.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn allocate(&self, app: AppId) -> NodeResult<VirtualId> {
        self.allocate_with(app, false).await
    }

    pub(super) async fn allocate_with(
        &self,
        app: AppId,
        ignore_limit: bool,
    ) -> NodeResult<VirtualId> {
        self.global_lock.acquire().await;
        let result = self.state().allocate_local(app, ignore_limit);
        self.global_lock.release();
        if let Ok(id) = result {
            debug!(qubit = %id, %app, "Allocated qubit");
        }
        result
    }

    /// Simulated location of an active virtual qubit.
    pub(super) fn resolve(&self, qubit: VirtualId) -> NodeResult<QubitRef> {
        Ok(self.state().active_virtual(qubit)?.sim.clone())
    }

    /// Send a request for `qubit` to its simulating node.
    ///
    /// A merge can move the qubit after we looked it up; the simulating node
    /// then answers `NotSimulatedHere` and we retry with the updated pointer.
    pub(super) async fn route(
        &self,
        qubit: VirtualId,
        request: impl Fn(SimId) -> Request + Send,
    ) -> NodeResult<Response> {
        Ok(self.route_at(qubit, request).await?.1)
    }

    /// Like [`Node::route`], also returning where the request was served.
    async fn route_at(
        &self,
        qubit: VirtualId,
        request: impl Fn(SimId) -> Request + Send,
    ) -> NodeResult<(QubitRef, Response)> {
        for attempt in 1..=self.settings.max_lock_attempts {
            let sim = self.resolve(qubit)?;
            let remote = self.remote(&sim.node).await?;
            match remote.call(request(sim.sim)).await {
                Ok(reply) => return Ok((sim, reply)),
                Err(NodeError::NotSimulatedHere(reason)) => {
                    debug!(%qubit, %sim, attempt, %reason, "Qubit moved, re-routing");
                    tokio::time::sleep(self.settings.qubit_retry()).await;
                }
                Err(e) => return Err(e),
            }
        }
        error!(%qubit, "Gave up re-routing a qubit that keeps moving");
        Err(NodeError::Quantum(format!(
            "{qubit} could not be reached after {} attempts",
            self.settings.max_lock_attempts
        )))
    }

    /// Apply a single-qubit gate.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn apply_gate(&self, qubit: VirtualId, gate: SingleQubitGate) -> NodeResult<()> {
        self.route(qubit, |sim| Request::ApplySingle { sim, gate })
            .await?
            .into_unit()
    }

    /// Rotate by `step · 2π/256` around `axis`.
    pub async fn rotate(&self, qubit: VirtualId, axis: Axis, step: u8) -> NodeResult<()> {
        self.apply_gate(qubit, axis.rotation(step)).await
    }

    /// Measure a qubit.
    ///
    /// Unless `in_place`, the qubit is destroyed afterwards.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn measure(&self, qubit: VirtualId, in_place: bool) -> NodeResult<u8> {
        let outcome = self
            .route(qubit, |sim| Request::Measure { sim, in_place })
            .await?
            .into_outcome()?;
        if !in_place {
            self.state().remove_virtual(qubit);
        }
        Ok(outcome)
    }

    /// Measure in place and flip back to `|0⟩`.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn reset(&self, qubit: VirtualId) -> NodeResult<()> {
        self.route(qubit, |sim| Request::Reset { sim })
            .await?
            .into_unit()
    }

    /// Destroy a qubit without reporting an outcome.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn release(&self, qubit: VirtualId) -> NodeResult<()> {
        self.measure(qubit, false).await.map(drop)
    }

    /// Release a qubit if it still exists, logging any failure.
    pub(super) async fn discard(&self, qubit: VirtualId) {
        if self.state().virtual_qubit(qubit).is_none() {
            return;
        }
        if let Err(e) = self.release(qubit).await {
            warn!(%qubit, error = %e, "Could not release qubit during cleanup");
        }
    }

    /// Id, owner, creation time and simulating node of a qubit.
    pub fn qubit_info(&self, qubit: VirtualId) -> NodeResult<QubitInfo> {
        let state = self.state();
        let vq = state.active_virtual(qubit)?;
        Ok(QubitInfo {
            id: qubit,
            owner: vq.owner,
            created_at: vq.created_at,
            sim: vq.sim.clone(),
        })
    }

    /// Register and slot currently holding a qubit's state.
    pub async fn locate(&self, qubit: VirtualId) -> NodeResult<QubitLocation> {
        let (sim, reply) = self
            .route_at(qubit, |sim| Request::Locate { sim })
            .await?;
        let position = reply.into_position()?;
        Ok(QubitLocation {
            node: sim.node,
            sim: sim.sim,
            register: position.register,
            position: position.position,
            size: position.size,
        })
    }
}
