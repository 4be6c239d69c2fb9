//! Stabilizer generators over GF(2).
//!
//! An `n`-qubit stabilizer state is described by `n` independent, commuting
//! Pauli operators, each stored as X bits, Z bits and a sign. A qubit with
//! both bits set carries a `Y`. Clifford gates act by conjugation, which
//! maps generators to generators and only ever touches one or two columns.

use rand::Rng;

/// One Pauli product `±P_0 ⊗ … ⊗ P_{n-1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Generator {
    x: Vec<bool>,
    z: Vec<bool>,
    negative: bool,
}

impl Generator {
    fn identity(num_qubits: usize) -> Self {
        Self {
            x: vec![false; num_qubits],
            z: vec![false; num_qubits],
            negative: false,
        }
    }

    /// `±Z` on `qubit`, identity elsewhere.
    fn z_on(num_qubits: usize, qubit: usize, negative: bool) -> Self {
        let mut generator = Self::identity(num_qubits);
        generator.z[qubit] = true;
        generator.negative = negative;
        generator
    }

    /// Bit of column `col`, X columns first.
    fn bit(&self, col: usize) -> bool {
        let n = self.x.len();
        if col < n { self.x[col] } else { self.z[col - n] }
    }

    /// Replace `self` with `other · self`.
    ///
    /// Both operators must commute, so the product stays Hermitian.
    fn multiply_by(&mut self, other: &Generator) {
        let mut exponent: i32 = 2 * i32::from(self.negative) + 2 * i32::from(other.negative);
        for q in 0..self.x.len() {
            exponent += phase_exponent(other.x[q], other.z[q], self.x[q], self.z[q]);
            self.x[q] ^= other.x[q];
            self.z[q] ^= other.z[q];
        }
        self.negative = exponent.rem_euclid(4) == 2;
    }

    fn remove_column(&mut self, qubit: usize) {
        self.x.remove(qubit);
        self.z.remove(qubit);
    }

    fn padded(&self, before: usize, after: usize) -> Self {
        let pad = |bits: &[bool]| {
            let mut out = vec![false; before];
            out.extend_from_slice(bits);
            out.resize(before + bits.len() + after, false);
            out
        };
        Self {
            x: pad(&self.x),
            z: pad(&self.z),
            negative: self.negative,
        }
    }
}

/// Power of `i` picked up when multiplying single-qubit Paulis `P1 · P2`.
fn phase_exponent(x1: bool, z1: bool, x2: bool, z2: bool) -> i32 {
    let (x2, z2) = (i32::from(x2), i32::from(z2));
    match (x1, z1) {
        (false, false) => 0,
        (true, true) => z2 - x2,
        (true, false) => z2 * (2 * x2 - 1),
        (false, true) => x2 * (1 - 2 * z2),
    }
}

/// Stabilizer state of `n` qubits held as `n` generators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tableau {
    num_qubits: usize,
    rows: Vec<Generator>,
}

impl Tableau {
    /// `|0…0⟩` on `num_qubits` qubits.
    pub fn new(num_qubits: usize) -> Self {
        Self {
            num_qubits,
            rows: (0..num_qubits)
                .map(|q| Generator::z_on(num_qubits, q, false))
                .collect(),
        }
    }

    /// Number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Flatten to one row per generator: X bits, Z bits, sign.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.num_qubits * (2 * self.num_qubits + 1));
        for row in &self.rows {
            data.extend(row.x.iter().map(|&b| f64::from(u8::from(b))));
            data.extend(row.z.iter().map(|&b| f64::from(u8::from(b))));
            data.push(f64::from(u8::from(row.negative)));
        }
        data
    }

    /// Rebuild from [`Tableau::to_flat`] output.
    ///
    /// Returns `None` if the length does not match or a value is not a bit.
    pub fn from_flat(num_qubits: usize, data: &[f64]) -> Option<Self> {
        let width = 2 * num_qubits + 1;
        if data.len() != num_qubits * width {
            return None;
        }
        let as_bit = |value: f64| match value {
            v if v == 0.0 => Some(false),
            v if v == 1.0 => Some(true),
            _ => None,
        };
        let mut rows = Vec::with_capacity(num_qubits);
        for chunk in data.chunks(width) {
            let bits = chunk.iter().map(|&v| as_bit(v)).collect::<Option<Vec<_>>>()?;
            rows.push(Generator {
                x: bits[..num_qubits].to_vec(),
                z: bits[num_qubits..2 * num_qubits].to_vec(),
                negative: bits[2 * num_qubits],
            });
        }
        Some(Self { num_qubits, rows })
    }

    /// Append a `|0⟩` qubit at the high end.
    pub fn push_zero(&mut self) {
        self.tensor(&Tableau::new(1));
    }

    /// Tensor `other` onto the high end; its qubits follow the current ones.
    pub fn tensor(&mut self, other: &Tableau) {
        let (n1, n2) = (self.num_qubits, other.num_qubits);
        let mut rows: Vec<Generator> = self.rows.iter().map(|r| r.padded(0, n2)).collect();
        rows.extend(other.rows.iter().map(|r| r.padded(n1, 0)));
        self.rows = rows;
        self.num_qubits = n1 + n2;
    }

    // =========================================================================
    // Clifford gates
    // =========================================================================

    pub fn apply_x(&mut self, q: usize) {
        for row in &mut self.rows {
            row.negative ^= row.z[q];
        }
    }

    pub fn apply_y(&mut self, q: usize) {
        for row in &mut self.rows {
            row.negative ^= row.x[q] ^ row.z[q];
        }
    }

    pub fn apply_z(&mut self, q: usize) {
        for row in &mut self.rows {
            row.negative ^= row.x[q];
        }
    }

    pub fn apply_h(&mut self, q: usize) {
        for row in &mut self.rows {
            row.negative ^= row.x[q] && row.z[q];
            std::mem::swap(&mut row.x[q], &mut row.z[q]);
        }
    }

    /// Phase gate `diag(1, i)`.
    pub fn apply_s(&mut self, q: usize) {
        for row in &mut self.rows {
            row.negative ^= row.x[q] && row.z[q];
            row.z[q] ^= row.x[q];
        }
    }

    /// `Z → Y`, `Y → Z`, `X → -X`.
    pub fn apply_k(&mut self, q: usize) {
        for row in &mut self.rows {
            row.x[q] ^= row.z[q];
            row.negative ^= row.x[q] && !row.z[q];
        }
    }

    pub fn apply_cnot(&mut self, control: usize, target: usize) {
        for row in &mut self.rows {
            row.negative ^= row.x[control] && row.z[target] && !(row.x[target] ^ row.z[control]);
            row.x[target] ^= row.x[control];
            row.z[control] ^= row.z[target];
        }
    }

    pub fn apply_cz(&mut self, control: usize, target: usize) {
        self.apply_h(target);
        self.apply_cnot(control, target);
        self.apply_h(target);
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Outcome of a Z measurement of `q` if it is fixed by the state.
    pub fn deterministic_outcome(&self, q: usize) -> Option<u8> {
        self.sign_of(&Generator::z_on(self.num_qubits, q, false))
            .map(u8::from)
    }

    /// Measure `q` in the computational basis and collapse.
    pub fn measure(&mut self, q: usize) -> Option<u8> {
        let Some(pivot) = self.rows.iter().position(|r| r.x[q]) else {
            return self.deterministic_outcome(q);
        };
        let pivot_row = self.rows[pivot].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i != pivot && row.x[q] {
                row.multiply_by(&pivot_row);
            }
        }
        let outcome = rand::thread_rng().gen_bool(0.5);
        self.rows[pivot] = Generator::z_on(self.num_qubits, q, outcome);
        Some(u8::from(outcome))
    }

    /// Remove `q`, which must already be measured.
    ///
    /// Returns `false` and leaves the state untouched if `q` is still
    /// entangled with the rest.
    pub fn drop_qubit(&mut self, q: usize) -> bool {
        if self.rows.iter().any(|r| r.x[q]) {
            return false;
        }
        let Some(pivot) = self.rows.iter().position(|r| r.z[q]) else {
            return false;
        };
        let pivot_row = self.rows.remove(pivot);
        for row in &mut self.rows {
            if row.z[q] {
                row.multiply_by(&pivot_row);
            }
            row.remove_column(q);
        }
        self.num_qubits -= 1;
        true
    }

    /// Sign with which `target` belongs to the stabilizer group.
    ///
    /// `Some(true)` for `-target`, `None` if neither sign is in the group.
    fn sign_of(&self, target: &Generator) -> Option<bool> {
        let n = self.num_qubits;
        let mut rows = self.rows.clone();
        let mut pivots = Vec::with_capacity(n);
        let mut next = 0;
        for col in 0..2 * n {
            let Some(found) = (next..rows.len()).find(|&i| rows[i].bit(col)) else {
                continue;
            };
            rows.swap(next, found);
            let pivot_row = rows[next].clone();
            for (i, row) in rows.iter_mut().enumerate() {
                if i != next && row.bit(col) {
                    row.multiply_by(&pivot_row);
                }
            }
            pivots.push((next, col));
            next += 1;
        }

        let mut product = Generator::identity(n);
        for (row, col) in pivots {
            if target.bit(col) {
                product.multiply_by(&rows[row]);
            }
        }
        (product.x == target.x && product.z == target.z).then_some(product.negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bell() -> Tableau {
        let mut t = Tableau::new(2);
        t.apply_h(0);
        t.apply_cnot(0, 1);
        t
    }

    #[test]
    fn test_fresh_state_is_zero() {
        let t = Tableau::new(3);
        for q in 0..3 {
            assert_eq!(t.deterministic_outcome(q), Some(0));
        }
    }

    #[test]
    fn test_x_flips_and_h_randomizes() {
        let mut t = Tableau::new(2);
        t.apply_x(1);
        assert_eq!(t.deterministic_outcome(1), Some(1));
        t.apply_h(0);
        assert_eq!(t.deterministic_outcome(0), None);
    }

    #[test]
    fn test_bell_pair_is_correlated() {
        for _ in 0..20 {
            let mut t = bell();
            assert_eq!(t.deterministic_outcome(1), None);
            let a = t.measure(0).unwrap();
            assert_eq!(t.deterministic_outcome(1), Some(a));
            assert!(t.drop_qubit(0));
            assert_eq!(t.num_qubits(), 1);
            assert_eq!(t.measure(0), Some(a));
        }
    }

    #[test]
    fn test_entangled_qubit_cannot_be_dropped() {
        let mut t = bell();
        assert!(!t.drop_qubit(0));
        assert_eq!(t, bell());
    }

    #[test]
    fn test_k_maps_zero_to_y_eigenstate() {
        let mut t = Tableau::new(1);
        t.apply_k(0);
        // K|0⟩ is the +1 eigenstate of Y, and K is self-inverse.
        let y = Generator {
            x: vec![true],
            z: vec![true],
            negative: false,
        };
        assert_eq!(t.sign_of(&y), Some(false));
        t.apply_k(0);
        assert_eq!(t.deterministic_outcome(0), Some(0));
    }

    #[test]
    fn test_cz_between_plus_states_is_undone_by_repeat() {
        let mut t = Tableau::new(2);
        t.apply_h(0);
        t.apply_h(1);
        t.apply_cz(0, 1);
        t.apply_cz(0, 1);
        t.apply_h(0);
        t.apply_h(1);
        assert_eq!(t.deterministic_outcome(0), Some(0));
        assert_eq!(t.deterministic_outcome(1), Some(0));
    }

    #[test]
    fn test_tensor_places_other_high() {
        let mut low = Tableau::new(1);
        let mut high = Tableau::new(1);
        high.apply_x(0);
        low.tensor(&high);
        assert_eq!(low.num_qubits(), 2);
        assert_eq!(low.deterministic_outcome(0), Some(0));
        assert_eq!(low.deterministic_outcome(1), Some(1));
    }

    #[test]
    fn test_flat_form_keeps_state() {
        let mut t = bell();
        t.apply_z(1);
        let back = Tableau::from_flat(2, &t.to_flat()).unwrap();
        assert_eq!(back, t);
        assert!(Tableau::from_flat(2, &[0.0; 9]).is_none());
        assert!(Tableau::from_flat(1, &[0.5, 1.0, 0.0]).is_none());
    }
}
