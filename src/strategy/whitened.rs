//! Whitened-covariance cuts.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::data::Action;
use crate::error::SplitError;
use crate::linalg::{
    generalized_eig_largest, pairwise_distances, sym_eig, whitening, Covariance,
    PolynomialExpansion,
};

use super::{LeafContext, SplitStrategy, TestParams};

/// Which covariance the cut direction is extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitenedVariant {
    /// Covariance of whitened feature deltas of the active action's
    /// transitions; cut along the direction of largest delta variance
    /// (generalized against the other actions' average when present).
    Delta,
    /// Covariance of delta differences between the targets of neighboring
    /// active transitions; cut along the direction of smallest variance
    /// (the "predictable" direction), optionally blended with the other
    /// actions' average by the factorization weight.
    NeighborDelta,
}

/// Generalized-eigenvector cut in whitened polynomial feature space.
///
/// Observations are expanded with a fixed-degree polynomial map, whitened by
/// the inverse square root of a prior-regularized covariance, and projected
/// onto the eigenvector picked per [`WhitenedVariant`]. The frozen test is
/// "projection of the centered expansion onto that direction is positive".
#[derive(Debug, Clone, Copy)]
pub struct WhitenedSplit {
    pub variant: WhitenedVariant,
    /// Polynomial expansion degree.
    pub degree: usize,
    /// Scale of the identity prior fed into every covariance; the effective
    /// pseudo-sample weight is `uncertainty_prior / (1000 * dim * actions)`.
    pub uncertainty_prior: f64,
    /// Convex blend weight towards the other actions' covariance
    /// (`NeighborDelta` only).
    pub factorization_weight: f64,
    /// Spatial neighbors per transition (`NeighborDelta` only).
    pub neighbors: usize,
}

impl Default for WhitenedSplit {
    fn default() -> Self {
        Self {
            variant: WhitenedVariant::Delta,
            degree: 5,
            uncertainty_prior: 100.0,
            factorization_weight: 0.0,
            neighbors: 15,
        }
    }
}

impl WhitenedSplit {
    fn prior_weight(&self, dim: usize, n_actions: usize) -> f64 {
        self.uncertainty_prior / (1000.0 * dim as f64 * n_actions.max(1) as f64)
    }

    fn delta_covariance(
        &self,
        deltas: ArrayView2<'_, f64>,
        dim: usize,
        n_actions: usize,
        center: bool,
    ) -> Array2<f64> {
        let mut cov = Covariance::new(dim);
        cov.add_prior(self.prior_weight(dim, n_actions));
        cov.update(deltas);
        cov.fix(center)
    }
}

impl SplitStrategy for WhitenedSplit {
    fn propose(&self, ctx: &LeafContext<'_>) -> Result<TestParams, SplitError> {
        let expansion = PolynomialExpansion::new(self.degree);
        let known: Vec<Action> = ctx.store.known_actions().iter().copied().collect();
        let n_actions = known.len();

        // transition sources feeding the cut
        let sources = match self.variant {
            WhitenedVariant::Delta => ctx.outgoing_sources(),
            WhitenedVariant::NeighborDelta => ctx.strict_sources(None),
        };
        if sources.len() < 2 {
            return Err(SplitError::InsufficientData {
                have: sources.len(),
                need: 2,
            });
        }

        // whitening basis: sources for Delta, sources plus targets for
        // NeighborDelta
        let whitening_refs: Vec<u32> = match self.variant {
            WhitenedVariant::Delta => sources.clone(),
            WhitenedVariant::NeighborDelta => {
                let mut refs: Vec<u32> = sources.iter().flat_map(|&r| [r, r + 1]).collect();
                refs.sort_unstable();
                refs.dedup();
                refs
            }
        };
        let expanded = expansion.expand_batch(ctx.data_for(&whitening_refs).view());
        let dim = expanded.ncols();
        let mean: Array1<f64> = &expanded.sum_axis(Axis(0)) / expanded.nrows() as f64;

        let mut cov = Covariance::new(dim);
        cov.add_prior(self.prior_weight(dim, n_actions));
        cov.update((&expanded - &mean).view());
        let w = whitening(&cov.fix(false))?;

        // whitened expansions of transition sources and targets
        let targets: Vec<u32> = sources.iter().map(|&r| r + 1).collect();
        let wh_1 = (&expansion.expand_batch(ctx.data_for(&sources).view()) - &mean).dot(&w);
        let wh_2 = (&expansion.expand_batch(ctx.data_for(&targets).view()) - &mean).dot(&w);

        let active_rows: Vec<usize> = sources
            .iter()
            .enumerate()
            .filter(|&(_, &r)| ctx.store.action(r) == Some(ctx.active_action))
            .map(|(i, _)| i)
            .collect();
        if active_rows.len() < 2 {
            return Err(SplitError::InsufficientData {
                have: active_rows.len(),
                need: 2,
            });
        }
        let act_1 = wh_1.select(Axis(0), &active_rows);
        let act_2 = wh_2.select(Axis(0), &active_rows);

        // averaged delta covariance of the other actions
        let inactive = if n_actions >= 2 {
            let mut sum: Option<Array2<f64>> = None;
            let mut count = 0.0;
            for &a in &known {
                if a == ctx.active_action {
                    continue;
                }
                let rows: Vec<usize> = sources
                    .iter()
                    .enumerate()
                    .filter(|&(_, &r)| ctx.store.action(r) == Some(a))
                    .map(|(i, _)| i)
                    .collect();
                if rows.is_empty() {
                    continue;
                }
                let deltas = wh_2.select(Axis(0), &rows) - wh_1.select(Axis(0), &rows);
                let c = self.delta_covariance(deltas.view(), dim, n_actions, false);
                sum = Some(match sum {
                    None => c,
                    Some(s) => s + c,
                });
                count += 1.0;
            }
            sum.map(|s| s / count)
        } else {
            None
        };

        let direction = match self.variant {
            WhitenedVariant::Delta => {
                let deltas = &act_2 - &act_1;
                let c_active = self.delta_covariance(deltas.view(), dim, n_actions, true);
                match &inactive {
                    Some(c_inactive) => generalized_eig_largest(&c_active, c_inactive)?,
                    None => {
                        let (_, vecs) = sym_eig(&c_active)?;
                        vecs.column(vecs.ncols() - 1).to_owned()
                    }
                }
            }
            WhitenedVariant::NeighborDelta => {
                // differences between the targets of spatially neighboring
                // active transitions
                let dist = pairwise_distances(act_1.view(), act_1.view());
                let n_act = active_rows.len();
                let k = self.neighbors.min(n_act - 1);
                let mut cov = Covariance::new(dim);
                cov.add_prior(self.prior_weight(dim, n_actions));
                for l in 0..n_act {
                    let mut order: Vec<usize> = (0..n_act).collect();
                    order.sort_by(|&a, &b| {
                        dist[[l, a]]
                            .partial_cmp(&dist[[l, b]])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    let hood = &order[..k + 1];
                    let mut deltas = Vec::new();
                    for ii in 0..hood.len() {
                        for jj in ii + 1..hood.len() {
                            let d = &act_2.row(hood[ii]) - &act_2.row(hood[jj]);
                            deltas.extend(d.iter().copied());
                        }
                    }
                    let rows = deltas.len() / dim;
                    if rows > 0 {
                        let batch = Array2::from_shape_vec((rows, dim), deltas)
                            .expect("delta buffer is rectangular");
                        cov.update(batch.view());
                    }
                }
                let mut c_final = cov.fix(true);
                if let Some(c_inactive) = &inactive {
                    let fw = self.factorization_weight;
                    c_final = c_final.mapv(|v| (1.0 - fw) * v) + c_inactive.mapv(|v| fw * v);
                }
                let (_, vecs) = sym_eig(&c_final)?;
                vecs.column(0).to_owned()
            }
        };

        Ok(TestParams::Projection {
            mean,
            direction: w.dot(&direction),
            degree: self.degree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObservationStore;
    use crate::tree::Tree;
    use ndarray::Array2;

    /// Alternating visits to two tight clusters on the x axis.
    fn alternating_clusters(n: usize) -> ObservationStore {
        let mut data = Array2::zeros((n, 2));
        let mut x = 29.0_f64;
        for i in 0..n {
            x = (x * 16807.0) % 2147483647.0;
            let jitter = (x / 2147483647.0 - 0.5) * 0.2;
            let center = if i % 2 == 0 { -2.0 } else { 2.0 };
            data[[i, 0]] = center + jitter;
            data[[i, 1]] = jitter;
        }
        let mut store = ObservationStore::new();
        store.append(data, &vec![0; n]).unwrap();
        store
    }

    fn root_ctx<'a>(store: &'a ObservationStore, tree: &'a Tree) -> LeafContext<'a> {
        LeafContext {
            store,
            tree,
            leaf: 0,
            active_action: 0,
        }
    }

    #[test]
    fn delta_cut_separates_alternating_clusters() {
        let store = alternating_clusters(80);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = (0..80).collect();

        let strategy = WhitenedSplit {
            degree: 2,
            ..Default::default()
        };
        let test = strategy.propose(&root_ctx(&store, &tree)).unwrap();

        let side_a = test.side(store.row(0));
        let side_b = test.side(store.row(1));
        assert_ne!(side_a, side_b);
        for i in 0..80u32 {
            let expected = if i % 2 == 0 { side_a } else { side_b };
            assert_eq!(test.side(store.row(i)), expected, "observation {i}");
        }
    }

    #[test]
    fn neighbor_delta_variant_produces_a_two_sided_test() {
        let store = alternating_clusters(60);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = (0..60).collect();

        let strategy = WhitenedSplit {
            variant: WhitenedVariant::NeighborDelta,
            degree: 2,
            neighbors: 5,
            ..Default::default()
        };
        let test = strategy.propose(&root_ctx(&store, &tree)).unwrap();
        let sides: Vec<u8> = (0..60u32).map(|i| test.side(store.row(i))).collect();
        assert!(sides.contains(&0) && sides.contains(&1));
    }

    #[test]
    fn insufficient_data_for_empty_leaf() {
        let store = alternating_clusters(10);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = vec![9];

        assert!(matches!(
            WhitenedSplit::default().propose(&root_ctx(&store, &tree)),
            Err(SplitError::InsufficientData { .. })
        ));
    }
}
