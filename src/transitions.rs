//! Per-action transition count matrices.
//!
//! One square matrix per action; entry `(s, t)` counts observed transitions
//! from state `s` to state `t` under that action. Matrices grow and shrink
//! together with the leaf set: a split inserts a row/column pair, a merge
//! folds one row/column into another. Both operations conserve the total
//! count exactly — any mismatch is a fatal bookkeeping error.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::data::{Action, ObservationStore};
use crate::error::ModelError;

/// The per-action transition matrices of one partitioning.
#[derive(Debug, Clone)]
pub struct TransitionStore {
    matrices: BTreeMap<Action, Array2<u64>>,
    n_states: usize,
}

impl TransitionStore {
    /// Empty store over `n_states` states.
    pub fn new(n_states: usize) -> Self {
        Self {
            matrices: BTreeMap::new(),
            n_states,
        }
    }

    /// Build the single-state store for a fresh partitioning: one 1x1 matrix
    /// per known action holding that action's transition count.
    pub fn for_new_partitioning(store: &ObservationStore) -> Self {
        let mut matrices = BTreeMap::new();
        for &a in store.known_actions() {
            let mut m = Array2::zeros((1, 1));
            m[[0, 0]] = store.transitions_for(a);
            matrices.insert(a, m);
        }
        Self {
            matrices,
            n_states: 1,
        }
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.n_states
    }

    /// Actions with a matrix, ascending.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.matrices.keys().copied()
    }

    #[inline]
    pub fn matrix(&self, action: Action) -> Option<&Array2<u64>> {
        self.matrices.get(&action)
    }

    /// Matrix for `action`, or zeros if the action has no recorded
    /// transitions between the current states yet.
    pub fn matrix_or_zeros(&self, action: Action) -> Array2<u64> {
        self.matrices
            .get(&action)
            .cloned()
            .unwrap_or_else(|| Array2::zeros((self.n_states, self.n_states)))
    }

    /// Count one observed transition.
    pub fn record(&mut self, source: usize, target: usize, action: Action) {
        let k = self.n_states;
        let m = self
            .matrices
            .entry(action)
            .or_insert_with(|| Array2::zeros((k, k)));
        m[[source, target]] += 1;
    }

    /// Total count over all actions.
    pub fn total(&self) -> u64 {
        self.matrices.values().map(|m| m.sum()).sum()
    }

    /// Sum of all per-action matrices.
    pub fn merged(&self) -> Array2<u64> {
        let mut out = Array2::zeros((self.n_states, self.n_states));
        for m in self.matrices.values() {
            out += m;
        }
        out
    }

    /// Swap in a new set of matrices (after a split has been derived).
    /// Verifies per-action count conservation against the current contents.
    pub fn replace(&mut self, matrices: BTreeMap<Action, Array2<u64>>) -> Result<(), ModelError> {
        let mut n_states = self.n_states;
        for (a, m) in &matrices {
            if m.nrows() != m.ncols() {
                return Err(ModelError::invariant("transition matrix must be square"));
            }
            n_states = m.nrows();
            let old_total = self.matrix_or_zeros(*a).sum();
            if m.sum() != old_total {
                return Err(ModelError::invariant(format!(
                    "transition count not conserved for action {a}: {} != {old_total}",
                    m.sum()
                )));
            }
        }
        self.matrices = matrices;
        self.n_states = n_states;
        Ok(())
    }

    /// Fold state `j` into state `i` (`i < j`) in every matrix.
    pub fn merge_states(&mut self, i: usize, j: usize) {
        debug_assert!(i < j && j < self.n_states);
        for m in self.matrices.values_mut() {
            *m = merge_row_col(m, i, j);
        }
        self.n_states -= 1;
    }
}

/// Insert a zeroed row and column immediately after `index`, leaving all
/// other entries untouched. The result is the starting point for
/// redistributing a split leaf's counts.
pub fn split_row_col(m: &Array2<u64>, index: usize) -> Array2<u64> {
    let k = m.nrows();
    debug_assert!(index < k);
    let mut out = Array2::zeros((k + 1, k + 1));
    for r in 0..k {
        let nr = if r > index { r + 1 } else { r };
        for c in 0..k {
            let nc = if c > index { c + 1 } else { c };
            out[[nr, nc]] = m[[r, c]];
        }
    }
    out
}

/// Add row/column `j` into row/column `i` (`i < j`), then delete row/column
/// `j`. Conserves the total count by construction.
pub fn merge_row_col(m: &Array2<u64>, i: usize, j: usize) -> Array2<u64> {
    let k = m.nrows();
    debug_assert!(i < j && j < k);
    let map = |r: usize| -> usize {
        if r == j {
            i
        } else if r > j {
            r - 1
        } else {
            r
        }
    };
    let mut out = Array2::zeros((k - 1, k - 1));
    for r in 0..k {
        for c in 0..k {
            out[[map(r), map(c)]] += m[[r, c]];
        }
    }
    out
}

/// Ground-truth recount of one action's transition matrix from the label and
/// action streams. Quadratic-free and obviously correct; the incremental
/// split update must reproduce it exactly.
pub fn recount(
    labels: &[usize],
    actions: &[Option<Action>],
    n_states: usize,
    action: Action,
) -> Array2<u64> {
    let mut m = Array2::zeros((n_states, n_states));
    for i in 0..labels.len().saturating_sub(1) {
        if actions[i] == Some(action) {
            m[[labels[i], labels[i + 1]]] += 1;
        }
    }
    m
}
