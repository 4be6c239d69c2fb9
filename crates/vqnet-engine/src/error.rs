//! Error types for the engine crate.

use thiserror::Error;

/// Errors that can occur inside a quantum state engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// No free slot is left in the engine.
    #[error("No qubit available: {0}")]
    NoQubit(String),

    /// The engine state and the requested operation disagree.
    #[error("Quantum error: {0}")]
    Quantum(String),

    /// The engine cannot represent the requested operation.
    #[error("Unsupported by engine: {0}")]
    Unsupported(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
