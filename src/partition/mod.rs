//! One action's view of the state space.
//!
//! A [`Partitioning`] couples a tree, a label vector and a transition store,
//! plus a cache of evaluated split candidates keyed by leaf. Partitionings
//! for different actions evolve independently over the same shared
//! observation store.

mod candidate;

pub use candidate::{EvalContext, SplitCandidate};

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::data::{Action, ObservationStore};
use crate::error::ModelError;
use crate::model::{GainMeasure, ModelConfig, ModelLogger};
use crate::strategy::SplitStrategy;
use crate::transitions::TransitionStore;
use crate::tree::{NodeId, Tree};

/// Tree + labels + transition matrices for one active action.
#[derive(Debug)]
pub struct Partitioning {
    active_action: Action,
    tree: Tree,
    labels: Vec<usize>,
    transitions: TransitionStore,
    cache: HashMap<NodeId, SplitCandidate>,
}

impl Partitioning {
    /// Fresh single-leaf partitioning over everything currently stored.
    pub fn new(store: &ObservationStore, active_action: Action) -> Self {
        let mut tree = Tree::new();
        tree.node_mut(Tree::ROOT).data_refs = (0..store.len() as u32).collect();
        Self {
            active_action,
            tree,
            labels: vec![0; store.len()],
            transitions: TransitionStore::for_new_partitioning(store),
            cache: HashMap::new(),
        }
    }

    #[inline]
    pub fn active_action(&self) -> Action {
        self.active_action
    }

    #[inline]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    #[inline]
    pub fn transitions(&self) -> &TransitionStore {
        &self.transitions
    }

    /// Number of states (leaves).
    pub fn num_states(&self) -> usize {
        self.tree.num_leaves()
    }

    /// Sum of all per-action matrices.
    pub fn merged_transition_matrix(&self) -> Array2<u64> {
        self.transitions.merged()
    }

    /// State labels for a batch of observations, by root-to-leaf descent.
    /// Read-only and idempotent.
    pub fn classify(&self, observations: ArrayView2<'_, f64>) -> Vec<usize> {
        let leaves = self.tree.leaves();
        let index_of: HashMap<NodeId, usize> =
            leaves.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        (0..observations.nrows())
            .into_par_iter()
            .map(|i| index_of[&self.tree.classify_row(observations.row(i))])
            .collect()
    }

    /// Number of strict transitions of one leaf under this partitioning's
    /// active action.
    pub fn strict_samples(&self, leaf: NodeId, store: &ObservationStore) -> usize {
        let refs = &self.tree.node(leaf).data_refs;
        refs.iter()
            .filter(|&&r| refs.binary_search(&(r + 1)).is_ok())
            .filter(|&&r| store.action(r) == Some(self.active_action))
            .count()
    }

    /// Evaluate (or reuse) a candidate for every eligible leaf and return
    /// the best `(leaf, gain)`. Leaves below the strict-sample threshold are
    /// excluded this round; candidates that fail degenerately are skipped.
    /// Ties keep the first-seen leaf.
    pub fn best_candidate(
        &mut self,
        store: &ObservationStore,
        config: &ModelConfig,
        strategy: &dyn SplitStrategy,
        logger: &ModelLogger,
    ) -> Result<Option<(NodeId, f64)>, ModelError> {
        let mut best: Option<(NodeId, f64)> = None;
        for leaf in self.tree.leaves() {
            let strict = self.strict_samples(leaf, store);
            if strict < config.min_split_samples {
                continue;
            }
            if !self.cache.contains_key(&leaf) {
                let ctx = EvalContext {
                    store,
                    tree: &self.tree,
                    labels: &self.labels,
                    transitions: &self.transitions,
                    leaf,
                    active_action: self.active_action,
                    config,
                };
                match SplitCandidate::evaluate(&ctx, strategy) {
                    Ok(candidate) => {
                        self.cache.insert(leaf, candidate);
                    }
                    Err(ModelError::Split(e)) => {
                        logger.debug(&format!(
                            "leaf {leaf} (action {}): no usable split: {e}",
                            self.active_action
                        ));
                        continue;
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
            let gain = self.cache[&leaf].gain();
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((leaf, gain));
            }
        }
        Ok(best)
    }

    /// Apply the cached candidate of `leaf`: mutate the tree, swap in the
    /// derived labels and matrices, and invalidate what the split made
    /// stale. Returns the applied gain.
    pub fn apply_split(
        &mut self,
        store: &ObservationStore,
        config: &ModelConfig,
        leaf: NodeId,
    ) -> Result<f64, ModelError> {
        let mut candidate = self
            .cache
            .remove(&leaf)
            .ok_or_else(|| ModelError::invariant("no cached candidate for split target"))?;
        {
            let ctx = EvalContext {
                store,
                tree: &self.tree,
                labels: &self.labels,
                transitions: &self.transitions,
                leaf,
                active_action: self.active_action,
                config,
            };
            candidate.new_labels(&ctx)?;
            candidate.new_data_refs(&ctx)?;
            candidate.new_transition_matrices(&ctx)?;
        }
        let gain = candidate.gain();
        let (test, new_labels, (refs_a, refs_b), new_trans) = candidate.into_parts()?;

        let owned = self.tree.node(leaf).data_refs.len();
        if refs_a.len() + refs_b.len() != owned {
            return Err(ModelError::invariant(format!(
                "split refs do not cover the leaf: {} + {} != {owned}",
                refs_a.len(),
                refs_b.len()
            )));
        }

        let (child_a, child_b) = self.tree.split(leaf, test)?;
        self.tree.node_mut(child_a).data_refs = refs_a;
        self.tree.node_mut(child_b).data_refs = refs_b;
        self.labels = new_labels;
        self.transitions.replace(new_trans)?;

        // under the global measure every cached gain referred to the old
        // whole-model MI
        if config.gain_measure == GainMeasure::Global {
            self.cache.clear();
        }
        Ok(gain)
    }

    /// Merge the two sibling leaves under `parent`: fold the right state
    /// into the left one, collapse the tree node, relabel. The structural
    /// half of the (unscheduled) merge phase.
    pub fn apply_merge(&mut self, parent: NodeId) -> Result<(), ModelError> {
        let (left, right) = self
            .tree
            .node(parent)
            .children()
            .ok_or(ModelError::NotALeaf(parent))?;
        let i = self
            .tree
            .leaf_index(left)
            .ok_or_else(|| ModelError::invariant("merge child is not a leaf"))?;
        let j = self
            .tree
            .leaf_index(right)
            .ok_or_else(|| ModelError::invariant("merge child is not a leaf"))?;
        if j != i + 1 {
            return Err(ModelError::invariant(
                "sibling leaves must occupy adjacent state labels",
            ));
        }

        let total_before = self.transitions.total();
        self.tree.collapse(parent)?;
        self.transitions.merge_states(i, j);
        for label in &mut self.labels {
            if *label == j {
                *label = i;
            } else if *label > j {
                *label -= 1;
            }
        }
        self.cache.clear();

        if self.transitions.total() != total_before {
            return Err(ModelError::invariant("merge lost transitions"));
        }
        Ok(())
    }

    /// Cost of merging the siblings under `parent`: mutual information of
    /// the merged-over-actions matrix now, minus after the fold.
    pub fn merge_cost(&self, parent: NodeId) -> Result<f64, ModelError> {
        let (left, right) = self
            .tree
            .node(parent)
            .children()
            .ok_or(ModelError::NotALeaf(parent))?;
        let i = self
            .tree
            .leaf_index(left)
            .ok_or_else(|| ModelError::invariant("merge child is not a leaf"))?;
        let j = self
            .tree
            .leaf_index(right)
            .ok_or_else(|| ModelError::invariant("merge child is not a leaf"))?;

        let now = self.transitions.merged().mapv(|c| c as f64);
        let after = crate::transitions::merge_row_col(&self.transitions.merged(), i, j)
            .mapv(|c| c as f64);
        Ok(crate::info::mutual_information(now.view())?
            - crate::info::mutual_information(after.view())?)
    }

    /// Absorb freshly appended observations: extend labels (classification
    /// happened against the pre-append tree), hand refs to their leaves,
    /// and count the new transitions including the boundary pair.
    pub fn extend(
        &mut self,
        new_labels: Vec<usize>,
        store: &ObservationStore,
        first_new: usize,
    ) -> Result<(), ModelError> {
        let leaves = self.tree.leaves();
        for (offset, &label) in new_labels.iter().enumerate() {
            if label >= leaves.len() {
                return Err(ModelError::invariant(format!(
                    "classified label {label} out of range for {} states",
                    leaves.len()
                )));
            }
            let leaf = leaves[label];
            self.tree
                .node_mut(leaf)
                .data_refs
                .push((first_new + offset) as u32);
        }
        self.labels.extend(new_labels);

        if self.labels.len() != store.len() {
            return Err(ModelError::invariant(
                "label vector diverged from observation stream",
            ));
        }

        let first_source = first_new.saturating_sub(1);
        for i in first_source..store.len().saturating_sub(1) {
            if let Some(action) = store.action(i as u32) {
                self.transitions
                    .record(self.labels[i], self.labels[i + 1], action);
            }
        }

        // any leaf may have gained data; all cached candidates are stale
        self.cache.clear();
        Ok(())
    }

    /// Check the structural invariants: contiguous labels, ref/label
    /// agreement, conserved transition totals. Used by tests and callers
    /// that want a paranoid checkpoint.
    pub fn validate(&self, store: &ObservationStore) -> Result<(), ModelError> {
        let leaves = self.tree.leaves();
        let k = leaves.len();

        let mut seen = vec![0usize; k];
        for &label in &self.labels {
            if label >= k {
                return Err(ModelError::invariant(format!(
                    "label {label} out of range for {k} states"
                )));
            }
            seen[label] += 1;
        }
        if store.len() > 0 && seen.iter().any(|&c| c == 0) {
            return Err(ModelError::invariant("a state label is unused"));
        }

        for (index, &leaf) in leaves.iter().enumerate() {
            let refs = &self.tree.node(leaf).data_refs;
            if refs.len() != seen[index] {
                return Err(ModelError::invariant(format!(
                    "leaf {index} owns {} refs but {} observations carry its label",
                    refs.len(),
                    seen[index]
                )));
            }
            for &r in refs {
                if self.labels[r as usize] != index {
                    return Err(ModelError::invariant(format!(
                        "ref {r} labeled {} but owned by leaf {index}",
                        self.labels[r as usize]
                    )));
                }
            }
        }

        if self.transitions.total() != store.known_transitions() {
            return Err(ModelError::invariant(format!(
                "transition total {} != {} known pairs",
                self.transitions.total(),
                store.known_transitions()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, StrategyKind, Verbosity};
    use crate::strategy::GridSplit;
    use ndarray::Array2 as Matrix;

    fn alternating_store(n: usize) -> ObservationStore {
        let mut data = Matrix::zeros((n, 1));
        for i in 0..n {
            data[[i, 0]] = if i % 2 == 0 { -1.0 } else { 1.0 };
        }
        let mut store = ObservationStore::new();
        store.append(data, &vec![0; n]).unwrap();
        store
    }

    fn config(min_samples: usize) -> ModelConfig {
        ModelConfig::builder()
            .strategy(StrategyKind::Grid)
            .min_split_samples(min_samples)
            .uncertainty_bias(0.5)
            .build()
    }

    #[test]
    fn fresh_partitioning_is_single_state() {
        let store = alternating_store(10);
        let p = Partitioning::new(&store, 0);
        assert_eq!(p.num_states(), 1);
        assert_eq!(p.labels(), &[0; 10]);
        assert_eq!(p.merged_transition_matrix()[[0, 0]], 9);
        p.validate(&store).unwrap();
    }

    #[test]
    fn best_candidate_and_apply_split() {
        let store = alternating_store(20);
        let mut p = Partitioning::new(&store, 0);
        let config = config(2);
        let logger = ModelLogger::new(Verbosity::Silent);

        let (leaf, gain) = p
            .best_candidate(&store, &config, &GridSplit, &logger)
            .unwrap()
            .expect("root must yield a candidate");
        assert!(gain > 0.5);

        let applied = p.apply_split(&store, &config, leaf).unwrap();
        assert_eq!(applied, gain);
        assert_eq!(p.num_states(), 2);
        p.validate(&store).unwrap();

        // alternating stream: all mass off-diagonal
        let m = p.merged_transition_matrix();
        assert_eq!(m[[0, 0]], 0);
        assert_eq!(m[[1, 1]], 0);
        assert_eq!(m.sum(), 19);
    }

    #[test]
    fn classify_agrees_with_labels_after_split() {
        let store = alternating_store(20);
        let mut p = Partitioning::new(&store, 0);
        let config = config(2);
        let logger = ModelLogger::new(Verbosity::Silent);
        let (leaf, _) = p
            .best_candidate(&store, &config, &GridSplit, &logger)
            .unwrap()
            .unwrap();
        p.apply_split(&store, &config, leaf).unwrap();

        let labels = p.classify(store.view());
        assert_eq!(labels, p.labels());
        // idempotent
        assert_eq!(p.classify(store.view()), labels);
    }

    #[test]
    fn threshold_excludes_thin_leaves() {
        let store = alternating_store(10);
        let mut p = Partitioning::new(&store, 0);
        let config = config(100);
        let logger = ModelLogger::new(Verbosity::Silent);
        assert!(p
            .best_candidate(&store, &config, &GridSplit, &logger)
            .unwrap()
            .is_none());
    }

    #[test]
    fn merge_undoes_a_split() {
        let store = alternating_store(20);
        let mut p = Partitioning::new(&store, 0);
        let config = config(2);
        let logger = ModelLogger::new(Verbosity::Silent);
        let (leaf, _) = p
            .best_candidate(&store, &config, &GridSplit, &logger)
            .unwrap()
            .unwrap();
        p.apply_split(&store, &config, leaf).unwrap();
        assert_eq!(p.num_states(), 2);

        let parents = p.tree().sibling_leaf_parents();
        assert_eq!(parents.len(), 1);
        // the alternating chain is all structure; merging it back is costly
        assert!(p.merge_cost(parents[0]).unwrap() > 0.5);

        p.apply_merge(parents[0]).unwrap();
        assert_eq!(p.num_states(), 1);
        assert_eq!(p.labels(), &[0; 20]);
        p.validate(&store).unwrap();
    }

    #[test]
    fn extend_absorbs_appended_batch() {
        let mut store = alternating_store(20);
        let mut p = Partitioning::new(&store, 0);
        let config = config(2);
        let logger = ModelLogger::new(Verbosity::Silent);
        let (leaf, _) = p
            .best_candidate(&store, &config, &GridSplit, &logger)
            .unwrap()
            .unwrap();
        p.apply_split(&store, &config, leaf).unwrap();

        // classify before appending, as the model driver does
        let batch = ndarray::array![[-1.0], [1.0], [-1.0]];
        let new_labels = p.classify(batch.view());
        let first_new = store.append(batch, &[0, 0, 0]).unwrap();
        p.extend(new_labels, &store, first_new).unwrap();

        assert_eq!(p.labels().len(), 23);
        p.validate(&store).unwrap();
    }
}
