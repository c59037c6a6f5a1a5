//! Pluggable split-test strategies.
//!
//! A strategy's entire contract is: given a leaf, produce a frozen binary
//! test ([`TestParams`]); given an observation and a frozen test, answer
//! which side it falls on. Everything else in the crate — candidate scoring,
//! relabeling, matrix updates — is strategy-agnostic.
//!
//! The concrete strategy is chosen once, at model construction, through
//! [`StrategyKind`](crate::model::StrategyKind).

mod grid;
mod spectral;
mod whitened;

pub use grid::GridSplit;
pub use spectral::SpectralSplit;
pub use whitened::{WhitenedSplit, WhitenedVariant};

use ndarray::{Array1, Array2, ArrayView1};

use crate::data::{Action, ObservationStore};
use crate::error::SplitError;
use crate::linalg::{KnnClassifier, PolynomialExpansion};
use crate::tree::{NodeId, Tree};

/// A frozen binary decision function over observations.
///
/// Once a leaf is split, its test never changes again; classification is the
/// composition of these from root to leaf.
#[derive(Debug, Clone)]
pub enum TestParams {
    /// Axis-parallel threshold: side 1 iff `x[dim] > cut`.
    Grid { dim: usize, cut: f64 },
    /// Nearest-neighbor vote against a stored bi-partition.
    Knn(KnnClassifier),
    /// Side 1 iff the polynomial expansion of `x`, centered at `mean`,
    /// projects positively onto `direction`.
    Projection {
        mean: Array1<f64>,
        direction: Array1<f64>,
        degree: usize,
    },
}

impl TestParams {
    /// Which side of the test the observation falls on.
    pub fn side(&self, x: ArrayView1<'_, f64>) -> u8 {
        match self {
            TestParams::Grid { dim, cut } => u8::from(x[*dim] > *cut),
            TestParams::Knn(classifier) => classifier.predict(x),
            TestParams::Projection {
                mean,
                direction,
                degree,
            } => {
                let y = PolynomialExpansion::new(*degree).expand(x);
                let proj = (&y - mean).dot(direction);
                u8::from(proj > 0.0)
            }
        }
    }
}

/// Everything a strategy may look at when proposing a test for one leaf.
pub struct LeafContext<'a> {
    pub store: &'a ObservationStore,
    pub tree: &'a Tree,
    pub leaf: NodeId,
    pub active_action: Action,
}

impl<'a> LeafContext<'a> {
    /// The leaf's sorted data refs.
    #[inline]
    pub fn refs(&self) -> &'a [u32] {
        &self.tree.node(self.leaf).data_refs
    }

    /// Sources of transitions that stay strictly inside the leaf, optionally
    /// restricted to one action.
    pub fn strict_sources(&self, action: Option<Action>) -> Vec<u32> {
        let refs = self.refs();
        refs.iter()
            .copied()
            .filter(|&r| refs.binary_search(&(r + 1)).is_ok())
            .filter(|&r| action.is_none() || self.store.action(r) == action)
            .collect()
    }

    /// Sources of all transitions leaving the leaf's observations (strictly
    /// inside or heading out), i.e. every ref that has a successor in the
    /// stream.
    pub fn outgoing_sources(&self) -> Vec<u32> {
        let n = self.store.len() as u32;
        self.refs()
            .iter()
            .copied()
            .filter(|&r| r + 1 < n)
            .collect()
    }

    /// Gather observation rows for a set of refs.
    pub fn data_for(&self, refs: &[u32]) -> Array2<f64> {
        self.store.rows_for(refs)
    }
}

/// The single capability every split-test strategy provides.
pub trait SplitStrategy: std::fmt::Debug {
    /// Propose a frozen test bi-partitioning the leaf, or report why none
    /// exists ([`SplitError::Degenerate`], [`SplitError::NonConvergence`],
    /// [`SplitError::InsufficientData`]).
    fn propose(&self, ctx: &LeafContext<'_>) -> Result<TestParams, SplitError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn grid_test_side() {
        let t = TestParams::Grid { dim: 1, cut: 0.5 };
        assert_eq!(t.side(array![9.0, 0.4].view()), 0);
        assert_eq!(t.side(array![-9.0, 0.6].view()), 1);
    }

    #[test]
    fn projection_test_side() {
        // degree 1, direction = x axis, mean at origin
        let t = TestParams::Projection {
            mean: array![0.0, 0.0],
            direction: array![1.0, 0.0],
            degree: 1,
        };
        assert_eq!(t.side(array![2.0, -3.0].view()), 1);
        assert_eq!(t.side(array![-2.0, 3.0].view()), 0);
    }

    #[test]
    fn strict_and_outgoing_sources() {
        use crate::data::ObservationStore;
        let mut store = ObservationStore::new();
        store
            .append(
                array![[0.0], [1.0], [2.0], [3.0], [4.0]],
                &[0, 0, 0, 0, 0],
            )
            .unwrap();
        let mut tree = Tree::new();
        tree.node_mut(0).data_refs = vec![0, 1, 3, 4];
        let ctx = LeafContext {
            store: &store,
            tree: &tree,
            leaf: 0,
            active_action: 0,
        };
        // pairs fully inside: (0,1) and (3,4)
        assert_eq!(ctx.strict_sources(Some(0)), vec![0, 3]);
        assert_eq!(ctx.strict_sources(Some(1)), Vec::<u32>::new());
        // 4 is the last observation, no successor
        assert_eq!(ctx.outgoing_sources(), vec![0, 1, 3]);
    }
}
