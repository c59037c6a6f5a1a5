//! Axis-parallel midpoint cuts.

use crate::error::SplitError;

use super::{LeafContext, SplitStrategy, TestParams};

/// Splits a leaf's inherited bounding hyper-box along its longest axis at
/// the midpoint.
///
/// The root box is the bounding box of all stored observations; each child
/// inherits its parent's box with the cut plane substituted on the cut side.
/// Needs no transition data and is fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSplit;

impl SplitStrategy for GridSplit {
    fn propose(&self, ctx: &LeafContext<'_>) -> Result<TestParams, SplitError> {
        if ctx.store.is_empty() {
            return Err(SplitError::Degenerate("no observations"));
        }
        let d = ctx.store.dim();
        let data = ctx.store.view();

        // bounding box of everything ever observed
        let mut minima = vec![f64::INFINITY; d];
        let mut maxima = vec![f64::NEG_INFINITY; d];
        for row in data.outer_iter() {
            for (dim, &v) in row.iter().enumerate() {
                minima[dim] = minima[dim].min(v);
                maxima[dim] = maxima[dim].max(v);
            }
        }

        // narrow along the ancestor chain of grid cuts
        let path = ctx.tree.path_from_root(ctx.leaf);
        for pair in path.windows(2) {
            let (node, child) = (pair[0], pair[1]);
            if let Some(&TestParams::Grid { dim, cut }) = ctx.tree.node(node).test() {
                let (left, _) = ctx
                    .tree
                    .node(node)
                    .children()
                    .expect("path nodes are internal");
                if child == left {
                    maxima[dim] = cut;
                } else {
                    minima[dim] = cut;
                }
            }
        }

        let mut dim = 0;
        let mut width = f64::NEG_INFINITY;
        for i in 0..d {
            let w = maxima[i] - minima[i];
            if w > width {
                width = w;
                dim = i;
            }
        }
        if !(width > 0.0) {
            return Err(SplitError::Degenerate("leaf box has zero width"));
        }
        let cut = minima[dim] + (maxima[dim] - minima[dim]) / 2.0;
        Ok(TestParams::Grid { dim, cut })
    }
}
