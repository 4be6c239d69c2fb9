//! vqnet Statevector Engine
//!
//! Default engine behind every vqnet register. It keeps the exact state of
//! the register's qubits as a dense vector of complex amplitudes, which is
//! exact but limited to roughly 20-25 qubits per register.
//!
//! # Layout
//!
//! Slot `k` of the register is bit `k` of the amplitude index. Fresh qubits
//! and absorbed registers are tensored onto the high end, so merging never
//! renumbers the qubits already present.
//!
//! # Performance
//!
//! | Qubits | Memory | Gate cost |
//! |--------|--------|-----------|
//! | 10 | ~16 KB | Instant |
//! | 15 | ~512 KB | Fast |
//! | 20 | ~16 MB | Moderate |
//! | 25 | ~512 MB | Slow |
//!
//! # Example
//!
//! ```ignore
//! use vqnet_adapter_statevector::StatevectorEngine;
//! use vqnet_engine::{Engine, SingleQubitGate, TwoQubitGate};
//!
//! let mut engine = StatevectorEngine::new(2);
//! let a = engine.allocate_fresh()?;
//! let b = engine.allocate_fresh()?;
//! engine.apply_single(a, SingleQubitGate::H)?;
//! engine.apply_two(a, b, TwoQubitGate::Cnot)?;
//!
//! // Correlated outcomes
//! assert_eq!(engine.measure(a, true)?, engine.measure(b, true)?);
//! ```

mod engine;
mod statevector;

pub use engine::{ENGINE_NAME, StatevectorEngine};
pub use statevector::Statevector;
