//! Statevector simulation kernel.

use num_complex::Complex64;
use std::f64::consts::PI;

use vqnet_engine::{SingleQubitGate, TwoQubitGate};

/// A statevector representing a quantum state.
///
/// Qubit `k` is bit `k` of the amplitude index.
#[derive(Debug, Clone, PartialEq)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1 << num_qubits;
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Rebuild a statevector from interleaved `re, im` pairs.
    ///
    /// Returns `None` when the length is not `2 · 2^num_qubits`.
    pub fn from_interleaved(num_qubits: usize, data: &[f64]) -> Option<Self> {
        if data.len() != 2usize.checked_shl(num_qubits as u32)? {
            return None;
        }
        let amplitudes = data
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect();
        Some(Self {
            amplitudes,
            num_qubits,
        })
    }

    /// Flatten into interleaved `re, im` pairs.
    pub fn to_interleaved(&self) -> Vec<f64> {
        self.amplitudes.iter().flat_map(|a| [a.re, a.im]).collect()
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// The raw amplitudes.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Append a |0⟩ qubit as the new highest bit.
    pub fn push_zero(&mut self) {
        let size = self.amplitudes.len();
        self.amplitudes.resize(size * 2, Complex64::new(0.0, 0.0));
        self.num_qubits += 1;
    }

    /// Tensor `other` onto the high end: `|other⟩ ⊗ |self⟩`.
    pub fn tensor(&mut self, other: &Statevector) {
        let low = self.amplitudes.len();
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); low * other.amplitudes.len()];
        for (j, b) in other.amplitudes.iter().enumerate() {
            if b.norm_sqr() == 0.0 {
                continue;
            }
            for (i, a) in self.amplitudes.iter().enumerate() {
                amplitudes[(j * low) | i] = a * b;
            }
        }
        self.amplitudes = amplitudes;
        self.num_qubits += other.num_qubits;
    }

    /// Apply a single-qubit gate.
    pub fn apply_single(&mut self, qubit: usize, gate: SingleQubitGate) {
        match gate {
            SingleQubitGate::I => {}
            SingleQubitGate::X => self.apply_x(qubit),
            SingleQubitGate::Y => self.apply_y(qubit),
            SingleQubitGate::Z => self.apply_z(qubit),
            SingleQubitGate::H => self.apply_h(qubit),
            SingleQubitGate::K => self.apply_k(qubit),
            SingleQubitGate::T => self.apply_phase(qubit, PI / 4.0),
            SingleQubitGate::RotX(step) => {
                self.apply_rx(qubit, SingleQubitGate::rotation_angle(step));
            }
            SingleQubitGate::RotY(step) => {
                self.apply_ry(qubit, SingleQubitGate::rotation_angle(step));
            }
            SingleQubitGate::RotZ(step) => {
                self.apply_rz(qubit, SingleQubitGate::rotation_angle(step));
            }
        }
    }

    /// Apply a two-qubit gate.
    pub fn apply_two(&mut self, control: usize, target: usize, gate: TwoQubitGate) {
        match gate {
            TwoQubitGate::Cnot => self.apply_cx(control, target),
            TwoQubitGate::Cphase => self.apply_cz(control, target),
        }
    }

    // =========================================================================
    // Single-qubit gate implementations
    // =========================================================================

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                self.amplitudes.swap(i, j);
            }
        }
    }

    fn apply_y(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        let i_val = Complex64::new(0.0, 1.0);
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                let tmp = self.amplitudes[i];
                self.amplitudes[i] = -i_val * self.amplitudes[j];
                self.amplitudes[j] = i_val * tmp;
            }
        }
    }

    fn apply_z(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..(1 << self.num_qubits) {
            if i & mask != 0 {
                self.amplitudes[i] = -self.amplitudes[i];
            }
        }
    }

    fn apply_h(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = sqrt2_inv * (a + b);
                self.amplitudes[j] = sqrt2_inv * (a - b);
            }
        }
    }

    // K = Z·H·S·H, up to a global phase.
    fn apply_k(&mut self, qubit: usize) {
        self.apply_h(qubit);
        self.apply_phase(qubit, PI / 2.0);
        self.apply_h(qubit);
        self.apply_z(qubit);
    }

    fn apply_phase(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase = Complex64::from_polar(1.0, theta);
        for i in 0..(1 << self.num_qubits) {
            if i & mask != 0 {
                self.amplitudes[i] *= phase;
            }
        }
    }

    fn apply_rx(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        let neg_i_s = Complex64::new(0.0, -s);
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a + neg_i_s * b;
                self.amplitudes[j] = neg_i_s * a + c * b;
            }
        }
    }

    fn apply_ry(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a - s * b;
                self.amplitudes[j] = s * a + c * b;
            }
        }
    }

    fn apply_rz(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase_0 = Complex64::from_polar(1.0, -theta / 2.0);
        let phase_1 = Complex64::from_polar(1.0, theta / 2.0);
        for i in 0..(1 << self.num_qubits) {
            if i & mask == 0 {
                self.amplitudes[i] *= phase_0;
            } else {
                self.amplitudes[i] *= phase_1;
            }
        }
    }

    // =========================================================================
    // Two-qubit gate implementations
    // =========================================================================

    fn apply_cx(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..(1 << self.num_qubits) {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                self.amplitudes.swap(i, j);
            }
        }
    }

    fn apply_cz(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..(1 << self.num_qubits) {
            if (i & ctrl_mask != 0) && (i & tgt_mask != 0) {
                self.amplitudes[i] = -self.amplitudes[i];
            }
        }
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Probability of reading 1 on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let mask = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & mask != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Sample and collapse `qubit`, returning the outcome.
    pub fn measure(&mut self, qubit: usize) -> u8 {
        use rand::Rng;
        let r: f64 = rand::thread_rng().r#gen();
        let outcome = u8::from(r < self.probability_one(qubit));
        self.collapse(qubit, outcome);
        outcome
    }

    /// Project `qubit` onto `outcome` and renormalize.
    pub fn collapse(&mut self, qubit: usize, outcome: u8) {
        let mask = 1 << qubit;
        let keep = if outcome == 1 { mask } else { 0 };
        let mut norm_sq = 0.0;
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask == keep {
                norm_sq += amp.norm_sqr();
            } else {
                *amp = Complex64::new(0.0, 0.0);
            }
        }
        let norm = norm_sq.sqrt();
        if norm > 0.0 {
            for amp in &mut self.amplitudes {
                *amp /= norm;
            }
        }
    }

    /// Remove a qubit that has already collapsed to `outcome`.
    ///
    /// Higher qubits shift down by one bit.
    pub fn drop_qubit(&mut self, qubit: usize, outcome: u8) {
        let low_mask = (1 << qubit) - 1;
        let fixed = usize::from(outcome) << qubit;
        let amplitudes = (0..(1 << (self.num_qubits - 1)))
            .map(|j: usize| {
                let old = (j & low_mask) | fixed | ((j & !low_mask) << 1);
                self.amplitudes[old]
            })
            .collect();
        self.amplitudes = amplitudes;
        self.num_qubits -= 1;
    }

    /// Squared norm of the state.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.iter().map(Complex64::norm_sqr).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_initial_state() {
        let sv = Statevector::new(2);
        assert!(approx_eq(sv.amplitudes[0], Complex64::new(1.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[1], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[2], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(0.0, 0.0)));
    }

    #[test]
    fn test_bell_state() {
        let mut sv = Statevector::new(2);
        sv.apply_single(0, SingleQubitGate::H);
        sv.apply_two(0, 1, TwoQubitGate::Cnot);

        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        assert!(approx_eq(sv.amplitudes[0], Complex64::new(sqrt2_inv, 0.0)));
        assert!(approx_eq(sv.amplitudes[1], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[2], Complex64::new(0.0, 0.0)));
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(sqrt2_inv, 0.0)));
    }

    #[test]
    fn test_k_gate_maps_to_y_basis() {
        let mut sv = Statevector::new(1);
        sv.apply_single(0, SingleQubitGate::K);

        // K|0⟩ is (|0⟩ + i|1⟩)/√2 up to a global phase.
        let ratio = sv.amplitudes[1] / sv.amplitudes[0];
        assert!(approx_eq(ratio, Complex64::new(0.0, 1.0)));
        assert!((sv.probability_one(0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_half_turn_rotation_flips() {
        let mut sv = Statevector::new(1);
        sv.apply_single(0, SingleQubitGate::RotX(128));
        assert!((sv.probability_one(0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cphase_sign() {
        let mut sv = Statevector::new(2);
        sv.apply_single(0, SingleQubitGate::X);
        sv.apply_single(1, SingleQubitGate::X);
        sv.apply_two(0, 1, TwoQubitGate::Cphase);
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(-1.0, 0.0)));
    }

    #[test]
    fn test_push_zero_keeps_state() {
        let mut sv = Statevector::new(1);
        sv.apply_single(0, SingleQubitGate::X);
        sv.push_zero();

        assert_eq!(sv.num_qubits(), 2);
        assert!(approx_eq(sv.amplitudes[1], Complex64::new(1.0, 0.0)));
        assert!((sv.probability_one(1)).abs() < 1e-10);
    }

    #[test]
    fn test_tensor_places_other_high() {
        let mut low = Statevector::new(1);
        let mut high = Statevector::new(1);
        high.apply_single(0, SingleQubitGate::X);
        low.tensor(&high);

        assert_eq!(low.num_qubits(), 2);
        assert!((low.probability_one(0)).abs() < 1e-10);
        assert!((low.probability_one(1) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_drop_qubit_compacts() {
        // |q2 q1 q0⟩ = |1 0 1⟩, drop q1 (outcome 0).
        let mut sv = Statevector::new(3);
        sv.apply_single(0, SingleQubitGate::X);
        sv.apply_single(2, SingleQubitGate::X);
        sv.drop_qubit(1, 0);

        assert_eq!(sv.num_qubits(), 2);
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn test_measure_deterministic() {
        let mut sv = Statevector::new(1);
        sv.apply_single(0, SingleQubitGate::X);

        for _ in 0..100 {
            assert_eq!(sv.measure(0), 1);
        }
    }

    #[test]
    fn test_interleaved_length_checked() {
        assert!(Statevector::from_interleaved(1, &[1.0, 0.0, 0.0, 0.0]).is_some());
        assert!(Statevector::from_interleaved(1, &[1.0, 0.0]).is_none());
    }

    fn gate_strategy() -> impl Strategy<Value = SingleQubitGate> {
        prop_oneof![
            Just(SingleQubitGate::X),
            Just(SingleQubitGate::Y),
            Just(SingleQubitGate::H),
            Just(SingleQubitGate::K),
            Just(SingleQubitGate::T),
            any::<u8>().prop_map(SingleQubitGate::RotX),
            any::<u8>().prop_map(SingleQubitGate::RotY),
            any::<u8>().prop_map(SingleQubitGate::RotZ),
        ]
    }

    proptest! {
        #[test]
        fn gates_preserve_norm(ops in prop::collection::vec((0usize..3, gate_strategy()), 0..40)) {
            let mut sv = Statevector::new(3);
            for (qubit, gate) in ops {
                sv.apply_single(qubit, gate);
                sv.apply_two(qubit, (qubit + 1) % 3, TwoQubitGate::Cnot);
            }
            prop_assert!((sv.norm_sqr() - 1.0).abs() < 1e-9);
        }
    }
}
