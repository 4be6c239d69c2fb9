//! Two-qubit gates and the register merge protocol.
//!
//! The gate needs both qubits in one register. The virtual node takes the
//! global lock of itself and of both simulating nodes, locks every qubit of
//! both registers, brings the registers together and applies the gate:
//!
//! | Where the registers live | What moves |
//! |--------------------------|-----------|
//! | same register | nothing |
//! | same node | local merge on that node |
//! | control here | target's register is pulled here |
//! | target here | control's register is pulled here |
//! | two other nodes | both are pulled into a fresh register here |
//!
//! Every pull is followed by an update broadcast so virtual qubits on any
//! node follow their state.
//!
//! Global locks are only ever *tried*. When any of them is busy the attempt
//! is rolled back and retried after a random delay.

use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, error, instrument, warn};

use vqnet_engine::TwoQubitGate;

use super::Node;
use crate::error::{NodeError, NodeResult};
use crate::ids::{QubitRef, RegisterId, SimId, VirtualId};
use crate::lock::Backoff;
use crate::transport::RemoteNode;

impl Node {
    /// Apply a two-qubit gate, merging registers as needed.
    ///
    /// Both qubits must be active, distinct and owned by the same
    /// application.
    #[instrument(skip(self), fields(node = %self.name))]
    pub async fn apply_two_qubit_gate(
        &self,
        control: VirtualId,
        target: VirtualId,
        gate: TwoQubitGate,
    ) -> NodeResult<()> {
        if control == target {
            return Err(NodeError::Unsupported(format!(
                "{gate} needs two different qubits, got {control} twice"
            )));
        }
        {
            let state = self.state();
            let c = state.active_virtual(control)?;
            let t = state.active_virtual(target)?;
            if c.owner != t.owner {
                return Err(NodeError::Unsupported(format!(
                    "{control} belongs to {} but {target} belongs to {}",
                    c.owner, t.owner
                )));
            }
        }

        let held = self.lock_involved_nodes(control, target).await?;
        let result = self.merge_and_apply(control, target, gate).await;
        self.release_global_locks(&held).await;
        result
    }

    /// Take the global locks of this node and both simulating nodes.
    ///
    /// Returns the names of the locked nodes.
    async fn lock_involved_nodes(
        &self,
        control: VirtualId,
        target: VirtualId,
    ) -> NodeResult<Vec<String>> {
        let backoff = Backoff::new(
            self.settings.lock_backoff_min_ms,
            self.settings.lock_backoff_max_ms,
        );
        for attempt in 1..=self.settings.max_lock_attempts {
            let (c, t) = (self.resolve(control)?, self.resolve(target)?);
            let nodes = BTreeSet::from([self.name.as_str(), c.node.as_str(), t.node.as_str()]);
            let nodes: Vec<String> = nodes.into_iter().map(String::from).collect();

            if self.try_lock_all(&nodes).await? {
                // A concurrent merge may have moved a register while we waited.
                if self.resolve(control)? == c && self.resolve(target)? == t {
                    debug!(attempt, nodes = ?nodes, "Acquired global locks");
                    return Ok(nodes);
                }
                debug!(attempt, "Operands moved while locking, retrying");
                self.release_global_locks(&nodes).await;
                continue;
            }

            let delay = backoff.next_delay();
            debug!(attempt, ?delay, nodes = ?nodes, "Global lock busy, backing off");
            tokio::time::sleep(delay).await;
        }
        error!(%control, %target, "Could not acquire the global locks for a two-qubit gate");
        Err(NodeError::Quantum(format!(
            "global locks for {control} and {target} not acquired after {} attempts",
            self.settings.max_lock_attempts
        )))
    }

    /// Try every lock at once; all or nothing.
    async fn try_lock_all(&self, nodes: &[String]) -> NodeResult<bool> {
        let attempts = join_all(nodes.iter().map(|name| async move {
            let remote = self.remote(name).await?;
            remote.try_acquire_global_lock().await
        }))
        .await;

        let acquired: Vec<String> = nodes
            .iter()
            .zip(&attempts)
            .filter(|(_, got)| matches!(got, Ok(true)))
            .map(|(name, _)| name.clone())
            .collect();
        if acquired.len() == nodes.len() {
            return Ok(true);
        }
        self.release_global_locks(&acquired).await;
        match attempts.into_iter().find_map(Result::err) {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    /// Best-effort release; failures are logged.
    async fn release_global_locks(&self, nodes: &[String]) {
        let results = join_all(nodes.iter().map(|name| async move {
            self.remote(name).await?.release_global_lock().await
        }))
        .await;
        for (name, result) in nodes.iter().zip(results) {
            if let Err(e) = result {
                warn!(peer = %name, error = %e, "Failed to release global lock");
            }
        }
    }

    /// Runs with all involved global locks held.
    async fn merge_and_apply(
        &self,
        control: VirtualId,
        target: VirtualId,
        gate: TwoQubitGate,
    ) -> NodeResult<()> {
        let (c, t) = (self.resolve(control)?, self.resolve(target)?);
        let groups = group_by_node(&[c.clone(), t.clone()]);

        let mut locked = Vec::new();
        for (node, sims) in &groups {
            match self.remote(node).await?.lock_registers(sims.clone()).await {
                Ok(()) => locked.push((node.clone(), sims.clone())),
                Err(e) => {
                    self.unlock_groups(&locked).await;
                    return Err(e);
                }
            }
        }

        let result = self.bring_together(&c, &t).await;
        let result = match result {
            Ok(()) => self.apply_merged(control, target, gate).await,
            Err(e) => Err(e),
        };

        // The registers may have moved; unlock them where they are now.
        let now = match (self.resolve(control), self.resolve(target)) {
            (Ok(c), Ok(t)) => group_by_node(&[c, t]),
            _ => groups,
        };
        self.unlock_groups(&now).await;
        result
    }

    async fn apply_merged(
        &self,
        control: VirtualId,
        target: VirtualId,
        gate: TwoQubitGate,
    ) -> NodeResult<()> {
        let (c, t) = (self.resolve(control)?, self.resolve(target)?);
        if c.node != t.node {
            error!(%c, %t, "Operands still on different nodes after merging");
            return Err(NodeError::Quantum(format!(
                "{c} and {t} were not merged into one register"
            )));
        }
        self.remote(&c.node)
            .await?
            .apply_two(c.sim, t.sim, gate)
            .await
    }

    async fn unlock_groups(&self, groups: &[(String, Vec<SimId>)]) {
        for (node, sims) in groups {
            let result = match self.remote(node).await {
                Ok(remote) => remote.unlock_registers(sims.clone()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(peer = %node, error = %e, "Failed to unlock registers");
            }
        }
    }

    /// Move the two registers into one.
    async fn bring_together(&self, c: &QubitRef, t: &QubitRef) -> NodeResult<()> {
        if c.node == t.node {
            debug!(node = %c.node, "Merging registers on one node");
            return self.remote(&c.node).await?.merge_local(c.sim, t.sim).await;
        }
        if c.node == self.name {
            let into = self.state().register_of(c.sim)?;
            return self.pull_register(t, into).await;
        }
        if t.node == self.name {
            let into = self.state().register_of(t.sim)?;
            return self.pull_register(c, into).await;
        }

        let into = self.state().new_register()?;
        let result = async {
            self.pull_register(c, into).await?;
            self.pull_register(t, into).await
        }
        .await;
        if result.is_err() {
            self.state().discard_if_empty(into);
        }
        result
    }

    /// Take the register holding `from` off its node and absorb it into the
    /// local register `into`, then tell every node where the qubits went.
    ///
    /// The source keeps its copy until the absorb succeeded here, so a
    /// failed hand-off leaves the register where it was.
    async fn pull_register(&self, from: &QubitRef, into: RegisterId) -> NodeResult<()> {
        let source = self.remote(&from.node).await?;
        let transfer = source.take_register(from.sim).await?;
        let moved = self
            .state()
            .absorb_transfer(into, &transfer)
            .inspect_err(|e| {
                warn!(register = %transfer.register, from = %from.node, error = %e,
                    "Could not absorb register, it stays on its node");
            })?;
        if let Err(e) = source.commit_take_register(transfer.register).await {
            self.settle_failed_commit(&source, from, into, &moved, e)
                .await?;
        }
        debug!(from = %from.node, register = %transfer.register, into = %into,
            qubits = moved.len(), "Pulled register");
        self.broadcast_update(&from.node, moved).await
    }

    /// Decide who owns a register after its commit reported `error`.
    ///
    /// The reply may have been lost after the source deleted the register.
    /// If the source still simulates the qubit, the local copy is dropped and
    /// the error returned. If the source cannot be asked, the local copy is
    /// kept so the state survives.
    async fn settle_failed_commit(
        &self,
        source: &RemoteNode,
        from: &QubitRef,
        into: RegisterId,
        moved: &[(SimId, SimId)],
        error: NodeError,
    ) -> NodeResult<()> {
        match source.locate(from.sim).await {
            Err(NodeError::NotSimulatedHere(_)) => {
                debug!(from = %from.node, error = %error,
                    "Commit reply lost, hand-off went through");
                Ok(())
            }
            Ok(_) => {
                warn!(from = %from.node, error = %error,
                    "Hand-off not committed, dropping local copy");
                self.state().drop_absorbed(into, moved)?;
                Err(error)
            }
            Err(locate_error) => {
                error!(from = %from.node, error = %error, locate = %locate_error,
                    "Cannot tell whether the hand-off committed, keeping local copy");
                Ok(())
            }
        }
    }

    async fn broadcast_update(
        &self,
        old_node: &str,
        moved: Vec<(SimId, SimId)>,
    ) -> NodeResult<()> {
        let names: Vec<String> = self.network.node_names().map(String::from).collect();
        let results = join_all(names.iter().map(|name| {
            let moved = moved.clone();
            async move {
                self.remote(name)
                    .await?
                    .update_after_merge(&self.name, old_node, moved)
                    .await
            }
        }))
        .await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                error!(peer = %name, error = %e, "Node missed a merge update");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Group simulated qubits by node, preserving first-seen order.
fn group_by_node(refs: &[QubitRef]) -> Vec<(String, Vec<SimId>)> {
    let mut groups: Vec<(String, Vec<SimId>)> = Vec::new();
    for r in refs {
        match groups.iter_mut().find(|(node, _)| *node == r.node) {
            Some((_, sims)) => sims.push(r.sim),
            None => groups.push((r.node.clone(), vec![r.sim])),
        }
    }
    groups
}
