//! Symmetric eigendecomposition via cyclic Jacobi rotations.
//!
//! Exact (to rounding) full-spectrum decomposition; quadratic per sweep in
//! the matrix size and cubic overall. All call sites in this crate pass small
//! dense symmetric matrices, where this beats an iterative solver on
//! robustness — there is no starting-vector or eigenvalue-gap sensitivity.

use ndarray::{Array1, Array2};

use crate::error::SplitError;

/// Sweep budget before a decomposition is reported as non-convergent.
pub const MAX_SWEEPS: usize = 64;

/// Floor applied to eigenvalues before inverting square roots.
const EIG_FLOOR: f64 = 1e-12;

/// Full eigendecomposition of a symmetric matrix.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvalues ascending and the
/// i-th column of the vector matrix corresponding to the i-th eigenvalue.
/// The input must be symmetric; only its lower triangle is trusted as far as
/// rounding asymmetry goes.
pub fn sym_eig(a: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>), SplitError> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols(), "matrix must be square");

    let mut m = a.clone();
    let mut v: Array2<f64> = Array2::eye(n);
    if n <= 1 {
        return Ok((m.diag().to_owned(), v));
    }

    let tol = 1e-14 * off_diagonal_norm(&m).max(1.0);
    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        if off_diagonal_norm(&m) <= tol {
            converged = true;
            break;
        }
        for p in 0..n - 1 {
            for q in p + 1..n {
                let apq = m[[p, q]];
                if apq.abs() <= f64::EPSILON * (m[[p, p]].abs() + m[[q, q]].abs()).max(1.0) {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate(&mut m, &mut v, p, q, c, s);
            }
        }
    }
    if !converged && off_diagonal_norm(&m) > tol {
        return Err(SplitError::NonConvergence {
            what: "jacobi eigendecomposition",
        });
    }

    let mut vals: Vec<(f64, usize)> = m.diag().iter().copied().zip(0..n).collect();
    vals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let eigenvalues = Array1::from_iter(vals.iter().map(|&(e, _)| e));
    let mut eigenvectors = Array2::zeros((n, n));
    for (dst, &(_, src)) in vals.iter().enumerate() {
        eigenvectors.column_mut(dst).assign(&v.column(src));
    }
    Ok((eigenvalues, eigenvectors))
}

/// Symmetric inverse square root `W = U diag(e^-1/2) U^T`.
///
/// Whitens data with covariance `c`: the covariance of `x W` is the identity
/// on the subspace where `c` has mass. Eigenvalues are floored to keep the
/// result finite on rank-deficient input.
pub fn whitening(c: &Array2<f64>) -> Result<Array2<f64>, SplitError> {
    let (vals, vecs) = sym_eig(c)?;
    let n = c.nrows();
    let mut w = Array2::zeros((n, n));
    for k in 0..n {
        let inv_sqrt = 1.0 / vals[k].max(EIG_FLOOR).sqrt();
        for i in 0..n {
            for j in 0..n {
                w[[i, j]] += vecs[[i, k]] * inv_sqrt * vecs[[j, k]];
            }
        }
    }
    Ok(w)
}

/// Eigenvector of the generalized symmetric problem `A v = λ B v` with the
/// largest eigenvalue, solved by pre-whitening with `B`.
///
/// `B` must be (near) positive definite; the prior fed into every covariance
/// in this crate guarantees that.
pub fn generalized_eig_largest(
    a: &Array2<f64>,
    b: &Array2<f64>,
) -> Result<Array1<f64>, SplitError> {
    let wb = whitening(b)?;
    let mut m = wb.dot(a).dot(&wb);
    // symmetrize rounding noise
    let mt = m.t().to_owned();
    m += &mt;
    m *= 0.5;
    let (_, vecs) = sym_eig(&m)?;
    let top = vecs.column(vecs.ncols() - 1);
    Ok(wb.dot(&top))
}

fn off_diagonal_norm(m: &Array2<f64>) -> f64 {
    let n = m.nrows();
    let mut sum = 0.0;
    for p in 0..n - 1 {
        for q in p + 1..n {
            sum += m[[p, q]] * m[[p, q]];
        }
    }
    (2.0 * sum).sqrt()
}

fn rotate(m: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = m.nrows();
    for i in 0..n {
        let (mip, miq) = (m[[i, p]], m[[i, q]]);
        m[[i, p]] = c * mip - s * miq;
        m[[i, q]] = s * mip + c * miq;
    }
    for j in 0..n {
        let (mpj, mqj) = (m[[p, j]], m[[q, j]]);
        m[[p, j]] = c * mpj - s * mqj;
        m[[q, j]] = s * mpj + c * mqj;
    }
    for i in 0..n {
        let (vip, viq) = (v[[i, p]], v[[i, q]]);
        v[[i, p]] = c * vip - s * viq;
        v[[i, q]] = s * vip + c * viq;
    }
}
