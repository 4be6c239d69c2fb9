//! vqnet Engine Contract
//!
//! This crate defines the interface between a vqnet node and the quantum
//! state container that backs each of its registers. Nodes only ever talk to
//! an engine through the [`Engine`] trait, so the simulation backend can be
//! swapped per process without touching the distributed register logic.
//!
//! # Overview
//!
//! - [`Engine`]: allocate, gate, measure, serialize, absorb
//! - [`StateBlob`]: the transient wire form of an engine's state
//! - [`SingleQubitGate`] / [`TwoQubitGate`]: the gate vocabulary
//!
//! # Supported Engines
//!
//! | Engine | Crate |
//! |--------|-------|
//! | Dense statevector | `vqnet-adapter-statevector` |
//! | Stabilizer tableau (Clifford only) | `vqnet-adapter-stabilizer` |
//!
//! # Implementing a Custom Engine
//!
//! ```ignore
//! use vqnet_engine::{Engine, EngineResult, SingleQubitGate, StateBlob, TwoQubitGate};
//!
//! struct MyEngine {
//!     capacity: usize,
//!     // ...
//! }
//!
//! impl Engine for MyEngine {
//!     fn name(&self) -> &str { "my_engine" }
//!
//!     fn capacity(&self) -> usize { self.capacity }
//!
//!     fn allocate_fresh(&mut self) -> EngineResult<usize> {
//!         // Append |0⟩, fail with EngineError::NoQubit at capacity
//!     }
//!
//!     fn absorb_parts(&mut self, blob: &StateBlob, count: usize) -> EngineResult<()> {
//!         // Tensor the incoming state after the current qubits
//!     }
//!
//!     // ... remaining methods
//! }
//! ```

pub mod engine;
pub mod error;
pub mod gate;

pub use engine::{Engine, StateBlob};
pub use error::{EngineError, EngineResult};
pub use gate::{Axis, ROTATION_STEPS, SingleQubitGate, TwoQubitGate};
