//! Entanglement metadata exchanged between the two halves of an EPR pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::AppId;

/// Which end of the pair a record is written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directionality {
    /// No direction recorded (flag 0).
    Undirected,
    /// Pair was created on this side (flag 1).
    Created,
    /// Pair was received on this side (flag 2).
    Received,
}

impl Directionality {
    /// The view from the other end.
    pub fn flipped(self) -> Self {
        match self {
            Directionality::Undirected => Directionality::Undirected,
            Directionality::Created => Directionality::Received,
            Directionality::Received => Directionality::Created,
        }
    }

    /// Numeric flag as used on the application wire.
    pub fn flag(self) -> u8 {
        match self {
            Directionality::Undirected => 0,
            Directionality::Created => 1,
            Directionality::Received => 2,
        }
    }
}

/// Metadata describing one EPR pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntanglementInfo {
    /// Node holding this half.
    pub node_a: String,
    /// Port of `node_a`.
    pub port_a: u16,
    /// Application holding this half.
    pub app_a: AppId,
    /// Node holding the other half.
    pub node_b: String,
    /// Port of `node_b`.
    pub port_b: u16,
    /// Application holding the other half.
    pub app_b: AppId,
    /// Sequence number of the pair for this `(app_a, node_b, app_b)` triple.
    pub id_ab: u32,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Time up to which `goodness` is valid.
    pub time_of_goodness: u64,
    /// Fidelity estimate.
    pub goodness: u16,
    /// Direction flag.
    pub direction: Directionality,
}

impl EntanglementInfo {
    /// Metadata for a freshly created pair, stamped with the current time.
    pub fn created(
        (node_a, port_a, app_a): (&str, u16, AppId),
        (node_b, port_b, app_b): (&str, u16, AppId),
        id_ab: u32,
    ) -> Self {
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        Self {
            node_a: node_a.to_string(),
            port_a,
            app_a,
            node_b: node_b.to_string(),
            port_b,
            app_b,
            id_ab,
            timestamp,
            time_of_goodness: timestamp,
            goodness: 0,
            direction: Directionality::Created,
        }
    }

    /// Rewrite the record from the point of view of the other end.
    pub fn switch_ends(&mut self) {
        std::mem::swap(&mut self.node_a, &mut self.node_b);
        std::mem::swap(&mut self.port_a, &mut self.port_b);
        std::mem::swap(&mut self.app_a, &mut self.app_b);
        self.direction = self.direction.flipped();
    }
}
