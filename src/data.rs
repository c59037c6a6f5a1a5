//! Append-only observation/action store.
//!
//! One store per model. Observations form an ordered stream; `actions[i]` is
//! the action taken between observations `i` and `i + 1`. The store is shared
//! read-only by every partitioning — the model owns it, partitionings only
//! hold views for the duration of a call.
//!
//! An action of `None` marks an unknown boundary (typically between two
//! `add_data` batches when the caller passed one action less than
//! observations); such transitions are excluded from every count.

use std::collections::BTreeSet;

use ndarray::{concatenate, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::ModelError;

/// Categorical action label.
pub type Action = usize;

/// The shared observation/action stream.
#[derive(Debug, Clone)]
pub struct ObservationStore {
    /// N x D observation matrix. Empty (0 x 0) until the first append.
    data: Array2<f64>,
    /// One entry per observation; `None` = unknown boundary action.
    actions: Vec<Option<Action>>,
    /// Distinct known actions seen so far.
    known: BTreeSet<Action>,
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationStore {
    pub fn new() -> Self {
        Self {
            data: Array2::zeros((0, 0)),
            actions: Vec::new(),
            known: BTreeSet::new(),
        }
    }

    /// Append a batch of observations with their actions.
    ///
    /// `actions` must have length `observations.nrows()` or one less; in the
    /// latter case the batch's final action is unknown and the transition out
    /// of the batch's last observation is excluded from all counts.
    ///
    /// Returns the index of the first appended row.
    pub fn append(
        &mut self,
        observations: Array2<f64>,
        actions: &[Action],
    ) -> Result<usize, ModelError> {
        let n = observations.nrows();
        if actions.len() != n && actions.len() + 1 != n {
            return Err(ModelError::ActionLenMismatch {
                rows: n,
                actions: actions.len(),
            });
        }
        if !self.is_empty() && observations.ncols() != self.dim() {
            return Err(ModelError::DimMismatch {
                expected: self.dim(),
                got: observations.ncols(),
            });
        }

        let first_new = self.len();
        if self.is_empty() {
            self.data = observations;
        } else {
            self.data = concatenate(Axis(0), &[self.data.view(), observations.view()])
                .map_err(|_| ModelError::DimMismatch {
                    expected: self.dim(),
                    got: 0,
                })?;
        }

        self.actions.extend(actions.iter().map(|&a| Some(a)));
        if actions.len() + 1 == n {
            self.actions.push(None);
        }
        self.known.extend(actions.iter().copied());

        debug_assert_eq!(self.actions.len(), self.len());
        Ok(first_new)
    }

    /// Number of observations.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// Single observation row.
    #[inline]
    pub fn row(&self, i: u32) -> ArrayView1<'_, f64> {
        self.data.row(i as usize)
    }

    /// Full observation matrix.
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Action taken between observations `i` and `i + 1`.
    #[inline]
    pub fn action(&self, i: u32) -> Option<Action> {
        self.actions[i as usize]
    }

    #[inline]
    pub fn actions(&self) -> &[Option<Action>] {
        &self.actions
    }

    /// Distinct actions seen so far, ascending.
    pub fn known_actions(&self) -> &BTreeSet<Action> {
        &self.known
    }

    /// Gather the rows named by `refs` into a dense matrix.
    pub fn rows_for(&self, refs: &[u32]) -> Array2<f64> {
        let idx: Vec<usize> = refs.iter().map(|&r| r as usize).collect();
        self.data.select(Axis(0), &idx)
    }

    /// Number of transition pairs `(i, i + 1)` with a known action. The sum
    /// of all per-action transition matrices must equal this.
    pub fn known_transitions(&self) -> u64 {
        if self.len() < 2 {
            return 0;
        }
        self.actions[..self.len() - 1]
            .iter()
            .filter(|a| a.is_some())
            .count() as u64
    }

    /// Number of transition pairs carrying one specific action.
    pub fn transitions_for(&self, action: Action) -> u64 {
        if self.len() < 2 {
            return 0;
        }
        self.actions[..self.len() - 1]
            .iter()
            .filter(|&&a| a == Some(action))
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn append_pads_short_actions_with_unknown() {
        let mut store = ObservationStore::new();
        let first = store
            .append(array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]], &[0, 1])
            .unwrap();
        assert_eq!(first, 0);
        assert_eq!(store.len(), 3);
        assert_eq!(store.action(0), Some(0));
        assert_eq!(store.action(1), Some(1));
        assert_eq!(store.action(2), None);
        assert_eq!(store.known_transitions(), 2);
    }

    #[test]
    fn append_keeps_boundary_action_when_full_length() {
        let mut store = ObservationStore::new();
        store.append(array![[0.0], [1.0]], &[0, 0]).unwrap();
        // the trailing action carries no transition yet
        assert_eq!(store.known_transitions(), 1);

        let first = store.append(array![[2.0], [3.0]], &[1, 1]).unwrap();
        assert_eq!(first, 2);
        // boundary transition 1 -> 2 now counts under action 0
        assert_eq!(store.known_transitions(), 3);
        assert_eq!(store.action(1), Some(0));
    }

    #[test]
    fn append_rejects_bad_action_length() {
        let mut store = ObservationStore::new();
        let err = store
            .append(array![[0.0], [1.0], [2.0]], &[0])
            .unwrap_err();
        assert!(matches!(err, ModelError::ActionLenMismatch { rows: 3, actions: 1 }));
    }

    #[test]
    fn append_rejects_dimension_change() {
        let mut store = ObservationStore::new();
        store.append(array![[0.0, 0.0]], &[0]).unwrap();
        let err = store.append(array![[1.0]], &[0]).unwrap_err();
        assert!(matches!(err, ModelError::DimMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn known_actions_accumulate() {
        let mut store = ObservationStore::new();
        store.append(array![[0.0], [1.0]], &[3]).unwrap();
        store.append(array![[2.0], [3.0]], &[1, 1]).unwrap();
        let known: Vec<Action> = store.known_actions().iter().copied().collect();
        assert_eq!(known, vec![1, 3]);
        assert_eq!(store.transitions_for(3), 1);
        assert_eq!(store.transitions_for(1), 1);
    }
}
