//! Entropy and mutual-information primitives.
//!
//! All quantities are in bits. These are pure functions over non-negative
//! weight vectors and transition count matrices; every gain computation in
//! the crate reduces to them.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::ModelError;

/// Shannon entropy of a non-negative weight vector.
///
/// The vector is normalized to a probability distribution internally.
/// Special cases:
///
/// - fewer than two entries: 0.0 (1.0 when `normalize` — a one-state
///   distribution is maximally "uniform"),
/// - all-zero vector: `log2(K)` (1.0 when `normalize`) if `ignore_empty`,
///   otherwise an invariant violation,
/// - any negative entry: invariant violation.
pub fn entropy(
    dist: ArrayView1<'_, f64>,
    normalize: bool,
    ignore_empty: bool,
) -> Result<f64, ModelError> {
    if dist.iter().any(|&w| w < 0.0) {
        return Err(ModelError::invariant("negative weight in distribution"));
    }

    let k = dist.len();
    if k <= 1 {
        return Ok(if normalize { 1.0 } else { 0.0 });
    }

    let total: f64 = dist.sum();
    if total == 0.0 {
        if !ignore_empty {
            return Err(ModelError::invariant("empty distribution"));
        }
        return Ok(if normalize { 1.0 } else { (k as f64).log2() });
    }

    let mut h = 0.0;
    for &w in dist.iter() {
        if w > 0.0 {
            let p = w / total;
            h -= p * p.log2();
        }
    }
    if normalize {
        h /= (k as f64).log2();
    }
    // rounding can push an exact-zero entropy slightly negative
    Ok(h.max(0.0))
}

/// Row-wise entropy of a transition matrix, weighted by each row's share of
/// the total mass. Rows with zero mass contribute nothing.
pub fn matrix_entropy(t: ArrayView2<'_, f64>, normalize: bool) -> Result<f64, ModelError> {
    let total: f64 = t.sum();
    if total <= 0.0 {
        return Err(ModelError::invariant("transition matrix has no mass"));
    }

    let mut h = 0.0;
    for row in t.axis_iter(Axis(0)) {
        let mass: f64 = row.sum();
        if mass > 0.0 {
            h += mass / total * entropy(row, normalize, true)?;
        }
    }
    Ok(h)
}

/// Mutual information between consecutive states of the Markov chain given
/// by a transition count matrix: entropy of the empirical state distribution
/// minus the mass-weighted row entropy.
///
/// Uniform rows give ≈ 0; a deterministic permutation on K equally visited
/// states gives `log2(K)`.
pub fn mutual_information(t: ArrayView2<'_, f64>) -> Result<f64, ModelError> {
    let weights: Array1<f64> = t.sum_axis(Axis(1));
    let h_state = entropy(weights.view(), false, false)?;
    let h_rows = matrix_entropy(t, false)?;
    Ok(h_state - h_rows)
}

/// Convert a count matrix to `f64`, adding `bias` to every cell.
///
/// The additive bias is the uncertainty smoothing applied before scoring
/// candidate splits on few samples.
pub fn biased(counts: &Array2<u64>, bias: f64) -> Array2<f64> {
    counts.mapv(|c| c as f64 + bias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn entropy_of_uniform_is_log_k() {
        for k in 2..10 {
            let ones = Array1::from_elem(k, 1.0);
            assert_abs_diff_eq!(
                entropy(ones.view(), false, false).unwrap(),
                (k as f64).log2(),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                entropy(ones.view(), true, false).unwrap(),
                1.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn entropy_known_values() {
        // [0, 1]: all mass on one class
        assert_abs_diff_eq!(
            entropy(array![0.0, 1.0].view(), false, false).unwrap(),
            0.0,
            epsilon = 1e-12
        );
        // [0, 1, 2] and [0, 1, 2, 3]
        assert_abs_diff_eq!(
            entropy(array![0.0, 1.0, 2.0].view(), false, false).unwrap(),
            0.9182958340544896,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            entropy(array![0.0, 1.0, 2.0, 3.0].view(), false, false).unwrap(),
            1.4591479170272448,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            entropy(array![0.0, 1.0, 2.0, 3.0].view(), true, false).unwrap(),
            0.7295739585136224,
            epsilon = 1e-12
        );
    }

    #[test]
    fn entropy_bounds_hold_for_arbitrary_weights() {
        let mut x = 1.0_f64;
        for k in 2..8 {
            for _ in 0..200 {
                // cheap deterministic pseudo-random weights
                let w: Array1<f64> = (0..k)
                    .map(|i| {
                        x = (x * 16807.0) % 2147483647.0;
                        (x / 2147483647.0) * (i as f64 + 1.0)
                    })
                    .collect();
                let e = entropy(w.view(), true, true).unwrap();
                assert!((0.0..=1.0).contains(&e));
                let e = entropy(w.view(), false, true).unwrap();
                assert!(e <= (k as f64).log2() + 1e-12);
            }
        }
    }

    #[test]
    fn entropy_rejects_negative_weights() {
        let err = entropy(array![1.0, -0.5].view(), false, false).unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation(_)));
    }

    #[test]
    fn entropy_of_empty_distribution() {
        let zeros = Array1::from_elem(4, 0.0);
        assert_abs_diff_eq!(entropy(zeros.view(), true, true).unwrap(), 1.0);
        assert_abs_diff_eq!(entropy(zeros.view(), false, true).unwrap(), 2.0);
        assert!(entropy(zeros.view(), false, false).is_err());
    }

    #[test]
    fn mutual_information_of_uniform_chain_is_zero() {
        let t = Array2::from_elem((8, 8), 10.0);
        assert_abs_diff_eq!(mutual_information(t.view()).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn mutual_information_of_deterministic_cycle_is_log_k() {
        let mut t = Array2::zeros((8, 8));
        for i in 0..8 {
            t[[i, (i + 1) % 8]] = 80.0;
        }
        assert_abs_diff_eq!(mutual_information(t.view()).unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn matrix_entropy_of_single_state_matrix() {
        // one state: row entropy 0, so the whole-model entropy is 0
        let t = array![[999.0]];
        assert_abs_diff_eq!(matrix_entropy(t.view(), false).unwrap(), 0.0);
        assert_abs_diff_eq!(mutual_information(t.view()).unwrap(), 0.0);
    }

    #[test]
    fn matrix_entropy_skips_empty_rows() {
        // terminal state with no outgoing mass
        let t = array![[5.0, 5.0], [0.0, 0.0]];
        let h = matrix_entropy(t.view(), false).unwrap();
        assert_abs_diff_eq!(h, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn biased_adds_uncertainty_to_every_cell() {
        let counts: Array2<u64> = array![[3, 0], [1, 2]];
        let b = biased(&counts, 10.0);
        assert_abs_diff_eq!(b[[0, 0]], 13.0);
        assert_abs_diff_eq!(b[[0, 1]], 10.0);
        assert_abs_diff_eq!(b.sum(), 46.0);
    }
}
