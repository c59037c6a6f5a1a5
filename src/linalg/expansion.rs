//! Polynomial feature expansion.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Expands a D-dimensional vector into all monomials of total degree
/// `1..=degree` over its components.
///
/// The output order is fixed: ascending total degree, lexicographic exponent
/// vectors within a degree. For D = 2, degree = 2 this yields
/// `[x, y, x^2, x*y, y^2]`. Output dimension is `C(D + degree, degree) - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolynomialExpansion {
    degree: usize,
}

impl PolynomialExpansion {
    pub fn new(degree: usize) -> Self {
        debug_assert!(degree >= 1, "degree must be at least 1");
        Self { degree }
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of output features for `input_dim` inputs.
    pub fn output_dim(&self, input_dim: usize) -> usize {
        // C(D + degree, degree) - 1
        let mut c: usize = 1;
        for i in 1..=self.degree {
            c = c * (input_dim + i) / i;
        }
        c - 1
    }

    /// Expand one vector.
    pub fn expand(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let exps = self.exponents(x.len());
        let mut out = Array1::zeros(exps.len());
        for (o, exp) in out.iter_mut().zip(&exps) {
            *o = monomial(x, exp);
        }
        out
    }

    /// Expand every row of a matrix.
    pub fn expand_batch(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let d = x.ncols();
        let exps = self.exponents(d);
        let mut out = Array2::zeros((x.nrows(), exps.len()));
        for (mut row_out, row) in out.outer_iter_mut().zip(x.outer_iter()) {
            for (o, exp) in row_out.iter_mut().zip(&exps) {
                *o = monomial(row, exp);
            }
        }
        out
    }

    fn exponents(&self, dim: usize) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut current = vec![0; dim];
        for total in 1..=self.degree {
            compositions(total, 0, &mut current, &mut out);
        }
        out
    }
}

fn monomial(x: ArrayView1<'_, f64>, exp: &[usize]) -> f64 {
    let mut v = 1.0;
    for (&xi, &e) in x.iter().zip(exp) {
        for _ in 0..e {
            v *= xi;
        }
    }
    v
}

/// Enumerate all ways to place `remaining` units into `current[at..]`,
/// lexicographically descending in the leading position.
fn compositions(remaining: usize, at: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if at + 1 == current.len() {
        current[at] = remaining;
        out.push(current.clone());
        current[at] = 0;
        return;
    }
    for lead in (0..=remaining).rev() {
        current[at] = lead;
        compositions(remaining - lead, at + 1, current, out);
        current[at] = 0;
    }
}
