//! Error types for node operations.
//!
//! Errors travel between nodes inside RPC responses, so every variant
//! carries only a message and the enum is serializable. A caller re-raises
//! exactly the failure kind the remote node produced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vqnet_engine::EngineError;

use crate::config::ConfigError;

/// Errors that can occur in node operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum NodeError {
    /// Capacity exceeded at allocate or merge time.
    #[error("No qubit available: {0}")]
    NoQubit(String),

    /// Internal consistency violation.
    #[error("Quantum error: {0}")]
    Quantum(String),

    /// Operation on an inactive, transferred or measured qubit.
    #[error("Qubit not active: {0}")]
    QubitNotActive(String),

    /// Operand combination not permitted.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A receive deadline passed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unrecognized node name or network.
    #[error("Unknown: {0}")]
    Unknown(String),

    /// The simulating node no longer holds the qubit.
    ///
    /// Consumed by re-routing; callers only see it as [`NodeError::Quantum`]
    /// once retries are exhausted.
    #[error("Not simulated here: {0}")]
    NotSimulatedHere(String),

    /// I/O or codec failure on an established connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<EngineError> for NodeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoQubit(msg) => NodeError::NoQubit(msg),
            EngineError::Unsupported(msg) => NodeError::Unsupported(msg),
            other => NodeError::Quantum(other.to_string()),
        }
    }
}

impl From<ConfigError> for NodeError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownNetwork(name) => {
                NodeError::Unknown(format!("network '{name}' is not configured"))
            }
            other => NodeError::Config(other.to_string()),
        }
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Transport(format!("codec: {err}"))
    }
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
