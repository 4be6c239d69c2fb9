//! vqnet Stabilizer Engine
//!
//! Clifford-only engine. A register of n qubits is kept as n stabilizer
//! generators over n qubits, so memory grows quadratically and registers of
//! hundreds of qubits stay cheap. `T` and rotations that are not a multiple
//! of a quarter turn are rejected with `EngineError::Unsupported`.
//!
//! Measurement follows the usual tableau rules: an outcome is random when
//! some generator anticommutes with `Z` on the measured slot, otherwise it
//! is fixed by the generators.
//!
//! # Example
//!
//! ```ignore
//! use vqnet_adapter_stabilizer::StabilizerEngine;
//! use vqnet_engine::{Engine, SingleQubitGate, TwoQubitGate};
//!
//! let mut engine = StabilizerEngine::new(2);
//! let a = engine.allocate_fresh()?;
//! let b = engine.allocate_fresh()?;
//! engine.apply_single(a, SingleQubitGate::H)?;
//! engine.apply_two(a, b, TwoQubitGate::Cnot)?;
//!
//! assert_eq!(engine.measure(a, true)?, engine.measure(b, true)?);
//! ```

mod engine;
mod tableau;

pub use engine::{ENGINE_NAME, StabilizerEngine};
pub use tableau::Tableau;
