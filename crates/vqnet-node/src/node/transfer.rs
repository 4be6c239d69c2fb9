//! Moving qubits between applications: send, recv and EPR pairs.

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use vqnet_engine::{SingleQubitGate, TwoQubitGate};

use super::Node;
use crate::entanglement::EntanglementInfo;
use crate::error::{NodeError, NodeResult};
use crate::ids::{AppId, SimId, VirtualId};
use crate::protocol::{DeliveryNote, DeliveryQueue, PendingDelivery, Request};

/// One half of an EPR pair together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EprHalf {
    /// The local half.
    pub qubit: VirtualId,
    /// Pair metadata, written from this half's point of view.
    pub entanglement: EntanglementInfo,
}

impl Node {
    fn check_target(&self, target: &str) -> NodeResult<()> {
        if !self.network.contains(target) {
            return Err(NodeError::Unknown(format!(
                "{target} is not part of the network"
            )));
        }
        if target != self.name && !self.is_adjacent(target) {
            return Err(NodeError::Unsupported(format!(
                "{} is not adjacent to {target}",
                self.name
            )));
        }
        Ok(())
    }

    /// Hand `qubit` to application `to_app` on `target`.
    ///
    /// On success the local handle is gone and the receiver claims the qubit
    /// with [`Node::recv`]. On failure the qubit stays usable.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn send(&self, qubit: VirtualId, target: &str, to_app: AppId) -> NodeResult<()> {
        self.check_target(target)?;
        self.send_to_queue(qubit, target, to_app, DeliveryQueue::Plain, None)
            .await
    }

    async fn send_to_queue(
        &self,
        qubit: VirtualId,
        target: &str,
        to_app: AppId,
        queue: DeliveryQueue,
        entanglement: Option<EntanglementInfo>,
    ) -> NodeResult<()> {
        let note = DeliveryNote {
            queue,
            from_node: self.name.clone(),
            from_app: self.state().active_virtual(qubit)?.owner,
            to_app,
            entanglement,
        };
        let new_id = self
            .route(qubit, |sim| Request::TransferQubit {
                sim,
                target: target.to_string(),
                note: note.clone(),
            })
            .await?
            .into_virtual()?;
        // The receiver holds the qubit and its queue entry; only now let go.
        self.state().remove_virtual(qubit);
        debug!(%qubit, target, remote_qubit = %new_id, ?queue, "Sent qubit");
        Ok(())
    }

    /// Simulating-node half of a send: register a pending owner on `target`
    /// and queue it there.
    ///
    /// Runs under this node's global lock so no merge can move the qubit
    /// while the target records where it lives.
    pub(super) async fn transfer_out(
        &self,
        sim: SimId,
        target: &str,
        note: DeliveryNote,
    ) -> NodeResult<VirtualId> {
        self.global_lock.acquire().await;
        let result = self.transfer_locked(sim, target, note).await;
        self.global_lock.release();
        result
    }

    async fn transfer_locked(
        &self,
        sim: SimId,
        target: &str,
        note: DeliveryNote,
    ) -> NodeResult<VirtualId> {
        if !self.state().is_simulated(sim) {
            return Err(NodeError::NotSimulatedHere(format!(
                "{sim} is not simulated on {}",
                self.name
            )));
        }
        self.remote(target)
            .await?
            .add_qubit(&self.name, sim, note)
            .await
    }

    /// Wait for a qubit sent to `app`.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn recv(&self, app: AppId) -> NodeResult<VirtualId> {
        let delivery = self.wait_for_delivery(DeliveryQueue::Plain, app).await?;
        Ok(delivery.qubit)
    }

    /// Wait for an EPR half sent to `app`.
    ///
    /// The metadata comes back switched to this end's point of view.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn recv_epr(&self, app: AppId) -> NodeResult<EprHalf> {
        let delivery = self.wait_for_delivery(DeliveryQueue::Epr, app).await?;
        let mut entanglement = delivery.entanglement.ok_or_else(|| {
            NodeError::Quantum(format!(
                "EPR delivery from {} carries no entanglement information",
                delivery.from_node
            ))
        })?;
        entanglement.switch_ends();
        Ok(EprHalf {
            qubit: delivery.qubit,
            entanglement,
        })
    }

    async fn wait_for_delivery(
        &self,
        queue: DeliveryQueue,
        app: AppId,
    ) -> NodeResult<PendingDelivery> {
        let deadline = Instant::now() + self.settings.recv_timeout();
        loop {
            let delivery = self.state().pop_delivery(queue, app);
            if let Some(delivery) = delivery {
                self.state().activate(delivery.qubit)?;
                debug!(qubit = %delivery.qubit, from = %delivery.from_node, "Received qubit");
                return Ok(delivery);
            }
            if Instant::now() >= deadline {
                return Err(NodeError::Timeout(format!(
                    "no qubit for {app} on {} within {:?}",
                    self.name,
                    self.settings.recv_timeout()
                )));
            }
            tokio::time::sleep(self.settings.recv_retry()).await;
        }
    }

    /// Create an EPR pair and send one half to `to_app` on `target`.
    ///
    /// If any step fails the qubits created so far are released.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn create_epr(
        &self,
        app: AppId,
        target: &str,
        to_app: AppId,
    ) -> NodeResult<EprHalf> {
        if target == self.name {
            return Err(NodeError::Unsupported(format!(
                "{target} cannot create an EPR pair with itself"
            )));
        }
        self.check_target(target)?;

        let kept = self.allocate(app).await?;
        let sent = match self.allocate_with(app, true).await {
            Ok(qubit) => qubit,
            Err(e) => {
                warn!(error = %e, "Second EPR qubit unavailable, releasing the first");
                self.discard(kept).await;
                return Err(e);
            }
        };

        match self.entangle_and_send(app, kept, sent, target, to_app).await {
            Ok(entanglement) => {
                info!(target, id_ab = entanglement.id_ab, "Created EPR pair");
                Ok(EprHalf {
                    qubit: kept,
                    entanglement,
                })
            }
            Err(e) => {
                warn!(error = %e, "EPR creation failed, releasing its qubits");
                self.discard(kept).await;
                self.discard(sent).await;
                Err(e)
            }
        }
    }

    async fn entangle_and_send(
        &self,
        app: AppId,
        kept: VirtualId,
        sent: VirtualId,
        target: &str,
        to_app: AppId,
    ) -> NodeResult<EntanglementInfo> {
        self.apply_gate(kept, SingleQubitGate::H).await?;
        self.apply_two_qubit_gate(kept, sent, TwoQubitGate::Cnot)
            .await?;

        let id_ab = self.state().next_entanglement_id(app, target, to_app);
        let port = |name: &str| self.network.endpoint(name).map_or(0, |e| e.port);
        let entanglement = EntanglementInfo::created(
            (self.name.as_str(), port(&self.name), app),
            (target, port(target), to_app),
            id_ab,
        );
        self.send_to_queue(
            sent,
            target,
            to_app,
            DeliveryQueue::Epr,
            Some(entanglement.clone()),
        )
        .await?;
        Ok(entanglement)
    }
}
