//! Learning-curve snapshots.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::info::{entropy, matrix_entropy, mutual_information};

/// Immutable snapshot of model quality, taken after every applied split.
/// The ordered sequence of these forms the learning curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of states (leaves).
    pub n_states: usize,
    /// Number of tree nodes, internal ones included.
    pub n_nodes: usize,
    /// Squared Frobenius-type norm of the visit-weighted transition kernel.
    pub norm: f64,
    /// Mass-weighted row entropy of the merged transition matrix, in bits.
    pub entropy: f64,
    /// Same, normalized to [0, 1] per row.
    pub entropy_normalized: f64,
    /// Mutual information between consecutive states, in bits.
    pub mutual_information: f64,
}

/// Compute a snapshot from the merged (summed over actions) transition
/// matrix.
pub fn calc_stats(merged: &Array2<u64>, n_nodes: usize) -> Result<Stats, ModelError> {
    let t = merged.mapv(|c| c as f64);
    let k = t.nrows();
    let weights: Array1<f64> = t.sum_axis(Axis(1));
    let total = weights.sum();
    if total <= 0.0 {
        return Err(ModelError::invariant("stats on an empty transition matrix"));
    }
    let mu = &weights / total;

    // norm of the visit-weighted kernel: sum over (i, j) of
    // p(j|i)^2 * mu_i / mu_j
    let mut norm = 0.0;
    for i in 0..k {
        if weights[i] == 0.0 {
            continue;
        }
        for j in 0..k {
            if mu[j] > 0.0 {
                let p = t[[i, j]] / weights[i];
                norm += p * p * mu[i] / mu[j];
            }
        }
    }

    Ok(Stats {
        n_states: k,
        n_nodes,
        norm,
        entropy: matrix_entropy(t.view(), false)?,
        entropy_normalized: matrix_entropy(t.view(), true)?,
        mutual_information: mutual_information(t.view())?,
    })
}
