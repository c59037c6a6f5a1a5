//! Spectral graph bi-partition with a k-NN classifier as the frozen test.

use std::collections::HashMap;

use ndarray::{Array1, Array2};

use crate::error::SplitError;
use crate::linalg::{pairwise_distances, sym_eig, KnnClassifier};

use super::{LeafContext, SplitStrategy, TestParams};

/// Graph-Laplacian style cut over the leaf's strict transition structure.
///
/// Builds a neighborhood transition graph over the active action's strict
/// transition pairs: every pair source is connected (symmetrically) to the
/// successors of its spatially nearest pair sources, on top of a small
/// uniform background weight. The sign pattern of the second leading
/// eigenvector (by magnitude) of the row-normalized walk bi-partitions the
/// sources; a k-NN classifier fitted on that bi-partition generalizes the
/// cut to arbitrary observations.
#[derive(Debug, Clone, Copy)]
pub struct SpectralSplit {
    /// Spatial neighbors per source when wiring the graph.
    pub k_neighbors: usize,
    /// `k` of the fitted classifier.
    pub classifier_k: usize,
    /// Cap on graph nodes; sources are stride-subsampled above it to bound
    /// the dense eigensolve.
    pub max_nodes: usize,
    /// Uniform background edge weight.
    pub baseline: f64,
}

impl Default for SpectralSplit {
    fn default() -> Self {
        Self {
            k_neighbors: 15,
            classifier_k: 15,
            max_nodes: 256,
            baseline: 0.01,
        }
    }
}

impl SplitStrategy for SpectralSplit {
    fn propose(&self, ctx: &LeafContext<'_>) -> Result<TestParams, SplitError> {
        let mut sources = ctx.strict_sources(Some(ctx.active_action));
        if sources.len() < 2 {
            return Err(SplitError::InsufficientData {
                have: sources.len(),
                need: 2,
            });
        }
        if sources.len() > self.max_nodes {
            // odd stride: an even one locks onto period-two alternation and
            // can drop one side of the structure entirely
            let stride = sources.len().div_ceil(self.max_nodes) | 1;
            sources = sources.into_iter().step_by(stride).collect();
        }
        if sources.len() < 2 {
            return Err(SplitError::InsufficientData {
                have: sources.len(),
                need: 2,
            });
        }
        let n1 = sources.len();

        // graph nodes: every source and every successor
        let mut nodes: Vec<u32> = sources.iter().flat_map(|&r| [r, r + 1]).collect();
        nodes.sort_unstable();
        nodes.dedup();
        let pos: HashMap<u32, usize> = nodes.iter().enumerate().map(|(i, &r)| (r, i)).collect();
        let n_all = nodes.len();

        let points = ctx.data_for(&sources);
        let dist = pairwise_distances(points.view(), points.view());

        let mut w = Array2::from_elem((n_all, n_all), self.baseline);
        let k = self.k_neighbors.min(n1 - 1);
        for i in 0..n1 {
            let mut order: Vec<usize> = (0..n1).collect();
            order.sort_by(|&a, &b| {
                dist[[i, a]]
                    .partial_cmp(&dist[[i, b]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            // nearest entry is the source itself
            for &j in order.iter().take(k + 1) {
                let (pi, pj) = (pos[&sources[i]], pos[&sources[j]]);
                let (pi1, pj1) = (pos[&(sources[i] + 1)], pos[&(sources[j] + 1)]);
                w[[pi, pj1]] = 1.0;
                w[[pj1, pi]] = 1.0;
                w[[pj, pi1]] = 1.0;
                w[[pi1, pj]] = 1.0;
            }
        }

        // symmetric normalization; W is symmetric, so the row-normalized
        // walk shares its spectrum with D^-1/2 W D^-1/2
        let degrees: Array1<f64> = w.sum_axis(ndarray::Axis(1));
        let inv_sqrt: Array1<f64> = degrees.mapv(|d| 1.0 / d.sqrt());
        let mut s = w;
        for i in 0..n_all {
            for j in 0..n_all {
                s[[i, j]] *= inv_sqrt[i] * inv_sqrt[j];
            }
        }

        let (vals, vecs) = sym_eig(&s)?;
        let mut order: Vec<usize> = (0..n_all).collect();
        order.sort_by(|&a, &b| {
            vals[b]
                .abs()
                .partial_cmp(&vals[a].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let second = order[1];

        // back to the row-normalized walk's eigenvector, restricted to the
        // pair sources, mean-centered
        let mut u = Array1::zeros(n1);
        for (i, &r) in sources.iter().enumerate() {
            u[i] = vecs[[pos[&r], second]] * inv_sqrt[pos[&r]];
        }
        let mean = u.sum() / n1 as f64;
        u -= mean;

        let labels: Vec<u8> = u.iter().map(|&v| u8::from(v > 0.0)).collect();
        if labels.iter().all(|&l| l == 0) || labels.iter().all(|&l| l == 1) {
            return Err(SplitError::Degenerate("one-sided spectral partition"));
        }

        let classifier = KnnClassifier::fit(points.clone(), labels, self.classifier_k);
        let fitted = classifier.predict_batch(points.view());
        if fitted.iter().all(|&l| l == 0) || fitted.iter().all(|&l| l == 1) {
            return Err(SplitError::Degenerate("classifier collapsed to one class"));
        }

        Ok(TestParams::Knn(classifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObservationStore;
    use crate::tree::Tree;
    use ndarray::Array2;

    /// Alternating visits to two tight, well-separated clusters.
    fn alternating_clusters(n: usize) -> ObservationStore {
        let mut data = Array2::zeros((n, 2));
        let mut x = 11.0_f64;
        for i in 0..n {
            x = (x * 16807.0) % 2147483647.0;
            let jitter = (x / 2147483647.0 - 0.5) * 0.2;
            let center = if i % 2 == 0 { -3.0 } else { 3.0 };
            data[[i, 0]] = center + jitter;
            data[[i, 1]] = jitter;
        }
        let mut store = ObservationStore::new();
        store.append(data, &vec![0; n]).unwrap();
        store
    }

    #[test]
    fn separates_alternating_clusters() {
        let store = alternating_clusters(60);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = (0..60).collect();
        let ctx = LeafContext {
            store: &store,
            tree: &tree,
            leaf: 0,
            active_action: 0,
        };

        let strategy = SpectralSplit {
            k_neighbors: 5,
            classifier_k: 5,
            ..Default::default()
        };
        let test = strategy.propose(&ctx).unwrap();

        // every point of one cluster lands on one side
        let side_a = test.side(store.row(0));
        let side_b = test.side(store.row(1));
        assert_ne!(side_a, side_b);
        for i in 0..60u32 {
            let expected = if i % 2 == 0 { side_a } else { side_b };
            assert_eq!(test.side(store.row(i)), expected, "observation {i}");
        }
    }

    #[test]
    fn insufficient_data_for_tiny_leaves() {
        let store = alternating_clusters(8);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = vec![0];
        let ctx = LeafContext {
            store: &store,
            tree: &tree,
            leaf: 0,
            active_action: 0,
        };
        assert!(matches!(
            SpectralSplit::default().propose(&ctx),
            Err(SplitError::InsufficientData { .. })
        ));
    }

    #[test]
    fn subsampling_keeps_the_cut_usable() {
        let store = alternating_clusters(120);
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = (0..120).collect();
        let ctx = LeafContext {
            store: &store,
            tree: &tree,
            leaf: 0,
            active_action: 0,
        };
        let strategy = SpectralSplit {
            k_neighbors: 5,
            classifier_k: 5,
            max_nodes: 40,
            baseline: 0.01,
        };
        let test = strategy.propose(&ctx).unwrap();
        let side_a = test.side(store.row(0));
        let side_b = test.side(store.row(1));
        assert_ne!(side_a, side_b);
    }
}
