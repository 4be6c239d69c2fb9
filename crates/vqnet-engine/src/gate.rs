//! Gate kinds understood by every engine.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Number of rotation steps in a full turn.
pub const ROTATION_STEPS: u32 = 256;

/// A single-qubit gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleQubitGate {
    /// Identity.
    I,
    /// Pauli-X.
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
    /// Hadamard.
    H,
    /// Maps the computational basis to the Y eigenbasis.
    K,
    /// π/8 gate.
    T,
    /// Rotation about X by `step · 2π/256`.
    RotX(u8),
    /// Rotation about Y by `step · 2π/256`.
    RotY(u8),
    /// Rotation about Z by `step · 2π/256`.
    RotZ(u8),
}

impl SingleQubitGate {
    /// Rotation angle in radians for a step count.
    pub fn rotation_angle(step: u8) -> f64 {
        f64::from(step) * 2.0 * PI / f64::from(ROTATION_STEPS)
    }
}

impl fmt::Display for SingleQubitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleQubitGate::I => write!(f, "i"),
            SingleQubitGate::X => write!(f, "x"),
            SingleQubitGate::Y => write!(f, "y"),
            SingleQubitGate::Z => write!(f, "z"),
            SingleQubitGate::H => write!(f, "h"),
            SingleQubitGate::K => write!(f, "k"),
            SingleQubitGate::T => write!(f, "t"),
            SingleQubitGate::RotX(step) => write!(f, "rot_x({step})"),
            SingleQubitGate::RotY(step) => write!(f, "rot_y({step})"),
            SingleQubitGate::RotZ(step) => write!(f, "rot_z({step})"),
        }
    }
}

/// A two-qubit gate, control first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoQubitGate {
    /// Controlled-NOT.
    Cnot,
    /// Controlled phase flip.
    Cphase,
}

impl fmt::Display for TwoQubitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoQubitGate::Cnot => write!(f, "cnot"),
            TwoQubitGate::Cphase => write!(f, "cphase"),
        }
    }
}

/// Axis of a rotation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// The rotation gate about this axis.
    pub fn rotation(self, step: u8) -> SingleQubitGate {
        match self {
            Axis::X => SingleQubitGate::RotX(step),
            Axis::Y => SingleQubitGate::RotY(step),
            Axis::Z => SingleQubitGate::RotZ(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_angle() {
        assert_eq!(SingleQubitGate::rotation_angle(0), 0.0);
        assert!((SingleQubitGate::rotation_angle(128) - PI).abs() < 1e-12);
        assert!((SingleQubitGate::rotation_angle(64) - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_axis_rotation() {
        assert_eq!(Axis::X.rotation(3), SingleQubitGate::RotX(3));
        assert_eq!(Axis::Z.rotation(255), SingleQubitGate::RotZ(255));
    }

    #[test]
    fn test_gate_wire_names() {
        let json = serde_json::to_string(&SingleQubitGate::RotY(7)).unwrap();
        assert_eq!(json, r#"{"rot_y":7}"#);
        let json = serde_json::to_string(&TwoQubitGate::Cphase).unwrap();
        assert_eq!(json, r#""cphase""#);
    }
}
