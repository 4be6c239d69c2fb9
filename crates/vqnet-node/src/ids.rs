//! Identifier types.
//!
//! All ids are allocated monotonically by the node that owns them and are
//! never reused, so a stale id can never alias a newer object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Client application (session) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId(pub u16);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app{}", self.0)
    }
}

impl From<u16> for AppId {
    fn from(id: u16) -> Self {
        AppId(id)
    }
}

/// Handle of a virtual qubit, unique per virtual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VirtualId(pub u32);

impl fmt::Display for VirtualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for VirtualId {
    fn from(id: u32) -> Self {
        VirtualId(id)
    }
}

/// Simulated qubit identifier, unique per simulating node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimId(pub u64);

impl fmt::Display for SimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Register identifier, unique per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterId(pub u64);

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Network-wide reference to a simulated qubit: node name plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitRef {
    /// Name of the simulating node.
    pub node: String,
    /// Id of the simulated qubit on that node.
    pub sim: SimId,
}

impl QubitRef {
    /// Create a reference.
    pub fn new(node: impl Into<String>, sim: SimId) -> Self {
        Self {
            node: node.into(),
            sim,
        }
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sim, self.node)
    }
}
