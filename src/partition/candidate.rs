//! Split candidate evaluation.
//!
//! A [`SplitCandidate`] is a fully evaluable, not-yet-applied proposal to
//! split one leaf. Evaluation freezes the test and the per-observation side
//! assignment and scores the gain; the derived artifacts — new label vector,
//! new data refs, new transition matrices — are computed lazily against the
//! *current* leaf indexation and memoized until the candidate is consumed.
//!
//! The incremental transition update must reproduce a full recount from the
//! streams exactly; under `debug_assertions` it is checked against one.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ndarray::Array2;

use crate::data::{Action, ObservationStore};
use crate::error::{ModelError, SplitError};
use crate::info::{biased, mutual_information};
use crate::model::{GainMeasure, ModelConfig};
use crate::strategy::{LeafContext, SplitStrategy, TestParams};
use crate::transitions::{split_row_col, TransitionStore};
use crate::tree::{NodeId, Tree};

/// Read-only view of everything candidate evaluation touches.
pub struct EvalContext<'a> {
    pub store: &'a ObservationStore,
    pub tree: &'a Tree,
    pub labels: &'a [usize],
    pub transitions: &'a TransitionStore,
    pub leaf: NodeId,
    pub active_action: Action,
    pub config: &'a ModelConfig,
}

impl<'a> EvalContext<'a> {
    fn leaf_refs(&self) -> &'a [u32] {
        &self.tree.node(self.leaf).data_refs
    }

    fn leaf_index(&self) -> Result<usize, ModelError> {
        self.tree
            .leaf_index(self.leaf)
            .ok_or_else(|| ModelError::invariant("split target is not a leaf"))
    }
}

/// A scored, cached, not-yet-applied split of one leaf.
#[derive(Debug, Clone)]
pub struct SplitCandidate {
    leaf: NodeId,
    active_action: Action,
    test: TestParams,
    gain: f64,
    /// Side of each of the leaf's data refs, in ref order. Frozen at
    /// evaluation; independent of the leaf indexation.
    sides: Vec<u8>,
    refs_at_eval: usize,
    new_labels: Option<Vec<usize>>,
    new_data_refs: Option<(Vec<u32>, Vec<u32>)>,
    new_transitions: Option<BTreeMap<Action, Array2<u64>>>,
}

impl SplitCandidate {
    /// Propose and score a split for the context's leaf.
    ///
    /// Fails with [`ModelError::Split`] when the strategy cannot produce a
    /// test or the test does not bi-partition the leaf's data; those
    /// failures are recoverable for the caller.
    pub fn evaluate(
        ctx: &EvalContext<'_>,
        strategy: &dyn SplitStrategy,
    ) -> Result<Self, ModelError> {
        let leaf_ctx = LeafContext {
            store: ctx.store,
            tree: ctx.tree,
            leaf: ctx.leaf,
            active_action: ctx.active_action,
        };
        let test = strategy.propose(&leaf_ctx)?;

        let refs = ctx.leaf_refs();
        if refs.is_empty() {
            return Err(SplitError::Degenerate("leaf owns no data").into());
        }
        let sides: Vec<u8> = refs.iter().map(|&r| test.side(ctx.store.row(r))).collect();
        if sides.iter().all(|&s| s == 0) || sides.iter().all(|&s| s == 1) {
            return Err(SplitError::Degenerate("split leaves one side empty").into());
        }

        let mut candidate = Self {
            leaf: ctx.leaf,
            active_action: ctx.active_action,
            test,
            gain: 0.0,
            sides,
            refs_at_eval: refs.len(),
            new_labels: None,
            new_data_refs: None,
            new_transitions: None,
        };
        candidate.gain = match ctx.config.gain_measure {
            GainMeasure::Local => candidate.local_gain(ctx)?,
            GainMeasure::Global => candidate.global_gain(ctx)?,
        };
        Ok(candidate)
    }

    #[inline]
    pub fn gain(&self) -> f64 {
        self.gain
    }

    #[inline]
    pub fn leaf(&self) -> NodeId {
        self.leaf
    }

    #[inline]
    pub fn test(&self) -> &TestParams {
        &self.test
    }

    /// New label vector: labels above the leaf's index shift up by one, the
    /// leaf's own observations land on index or index + 1 per their side.
    pub fn new_labels(&mut self, ctx: &EvalContext<'_>) -> Result<&[usize], ModelError> {
        if self.new_labels.is_none() {
            self.check_unchanged(ctx)?;
            let cur = ctx.leaf_index()?;
            let mut labels: Vec<usize> = ctx
                .labels
                .iter()
                .map(|&l| if l > cur { l + 1 } else { l })
                .collect();
            for (&r, &side) in ctx.leaf_refs().iter().zip(&self.sides) {
                labels[r as usize] = cur + side as usize;
            }
            self.new_labels = Some(labels);
        }
        Ok(self.new_labels.as_deref().expect("just computed"))
    }

    /// The two sorted data-ref sets implied by the new labels.
    pub fn new_data_refs(
        &mut self,
        ctx: &EvalContext<'_>,
    ) -> Result<&(Vec<u32>, Vec<u32>), ModelError> {
        if self.new_data_refs.is_none() {
            self.check_unchanged(ctx)?;
            let mut side_a = Vec::new();
            let mut side_b = Vec::new();
            for (&r, &side) in ctx.leaf_refs().iter().zip(&self.sides) {
                if side == 0 {
                    side_a.push(r);
                } else {
                    side_b.push(r);
                }
            }
            if side_a.is_empty() || side_b.is_empty() {
                return Err(SplitError::Degenerate("split leaves one side empty").into());
            }
            self.new_data_refs = Some((side_a, side_b));
        }
        Ok(self.new_data_refs.as_ref().expect("just computed"))
    }

    /// Grown transition matrices: the leaf's row/column pair is recomputed
    /// from the new labels; everything not touching the leaf is untouched.
    /// Reproduces a full recount exactly.
    pub fn new_transition_matrices(
        &mut self,
        ctx: &EvalContext<'_>,
    ) -> Result<&BTreeMap<Action, Array2<u64>>, ModelError> {
        if self.new_transitions.is_none() {
            let cur = ctx.leaf_index()?;
            let k = ctx.transitions.num_states();
            let new_labels = self.new_labels(ctx)?.to_vec();

            // every transition pair with an endpoint in the split leaf
            let n = ctx.store.len() as u32;
            let mut touched: BTreeSet<u32> = BTreeSet::new();
            for &r in ctx.leaf_refs() {
                if r + 1 < n {
                    touched.insert(r);
                }
                if r > 0 {
                    touched.insert(r - 1);
                }
            }

            let mut out = BTreeMap::new();
            for action in ctx.store.known_actions().iter().copied() {
                let old = ctx.transitions.matrix_or_zeros(action);
                let mut m = split_row_col(&old, cur);
                for t in 0..k + 1 {
                    m[[cur, t]] = 0;
                    m[[cur + 1, t]] = 0;
                    m[[t, cur]] = 0;
                    m[[t, cur + 1]] = 0;
                }
                for &r in &touched {
                    if ctx.store.action(r) == Some(action) {
                        let (s, t) = (new_labels[r as usize], new_labels[r as usize + 1]);
                        m[[s, t]] += 1;
                    }
                }
                if m.sum() != old.sum() {
                    return Err(ModelError::invariant(format!(
                        "split update lost transitions for action {action}: {} != {}",
                        m.sum(),
                        old.sum()
                    )));
                }
                #[cfg(debug_assertions)]
                {
                    let full =
                        crate::transitions::recount(&new_labels, ctx.store.actions(), k + 1, action);
                    debug_assert_eq!(m, full, "incremental update diverged from recount");
                }
                out.insert(action, m);
            }
            self.new_transitions = Some(out);
        }
        Ok(self.new_transitions.as_ref().expect("just computed"))
    }

    /// Consume the candidate into its apply-ready parts. All derived values
    /// must have been computed.
    pub(crate) fn into_parts(
        self,
    ) -> Result<
        (
            TestParams,
            Vec<usize>,
            (Vec<u32>, Vec<u32>),
            BTreeMap<Action, Array2<u64>>,
        ),
        ModelError,
    > {
        match (self.new_labels, self.new_data_refs, self.new_transitions) {
            (Some(labels), Some(refs), Some(trans)) => Ok((self.test, labels, refs, trans)),
            _ => Err(ModelError::invariant(
                "candidate consumed before derivation",
            )),
        }
    }

    /// The leaf's data must not have changed since evaluation; the cache
    /// owner clears candidates on data changes, so a mismatch here is
    /// corrupted bookkeeping.
    fn check_unchanged(&self, ctx: &EvalContext<'_>) -> Result<(), ModelError> {
        if ctx.leaf_refs().len() != self.refs_at_eval {
            return Err(ModelError::invariant(
                "stale split candidate: leaf data changed since evaluation",
            ));
        }
        Ok(())
    }

    /// Blended mutual information of the 2x2 transition matrices induced by
    /// the split on the leaf's strict transitions. Smoothed by the
    /// uncertainty bias; the active action and the mean of the other actions
    /// weigh half each.
    fn local_gain(&self, ctx: &EvalContext<'_>) -> Result<f64, ModelError> {
        let refs = ctx.leaf_refs();
        let side_of: HashMap<u32, u8> = refs.iter().copied().zip(self.sides.iter().copied()).collect();

        let known = ctx.store.known_actions();
        let bias = ctx.config.uncertainty_bias;
        let mut matrices: BTreeMap<Action, Array2<f64>> = known
            .iter()
            .map(|&a| (a, Array2::from_elem((2, 2), bias)))
            .collect();

        for &r in refs {
            let Some(&target_side) = side_of.get(&(r + 1)) else {
                continue; // transition leaves the leaf
            };
            if let Some(action) = ctx.store.action(r) {
                let source_side = side_of[&r];
                if let Some(m) = matrices.get_mut(&action) {
                    m[[source_side as usize, target_side as usize]] += 1.0;
                }
            }
        }

        self.blend(ctx, |action| {
            mutual_information(matrices[&action].view())
        })
    }

    /// Whole-model mutual information after the split minus before, both
    /// smoothed with the uncertainty bias and blended across actions like
    /// the local measure.
    fn global_gain(&mut self, ctx: &EvalContext<'_>) -> Result<f64, ModelError> {
        let bias = ctx.config.uncertainty_bias;
        let new_trans = self.new_transition_matrices(ctx)?.clone();

        let mi_old = self.blend(ctx, |action| {
            let m = ctx.transitions.matrix_or_zeros(action);
            mutual_information(biased(&m, bias).view())
        })?;
        let mi_new = self.blend(ctx, |action| {
            mutual_information(biased(&new_trans[&action], bias).view())
        })?;
        Ok(mi_new - mi_old)
    }

    /// 50/50 blend between the active action's value and the mean over all
    /// other actions (when any exist).
    fn blend<F>(&self, ctx: &EvalContext<'_>, mut value: F) -> Result<f64, ModelError>
    where
        F: FnMut(Action) -> Result<f64, ModelError>,
    {
        let known = ctx.store.known_actions();
        let active = value(self.active_action)?;
        if known.len() < 2 {
            return Ok(active);
        }
        let mut sum = 0.0;
        for &a in known.iter().filter(|&&a| a != self.active_action) {
            sum += value(a)?;
        }
        let inactive = sum / (known.len() - 1) as f64;
        Ok((active + inactive) / 2.0)
    }
}
