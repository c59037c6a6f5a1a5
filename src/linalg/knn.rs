//! Brute-force k-nearest-neighbor classification.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Euclidean distance matrix between the rows of `a` and the rows of `b`.
///
/// Rows are processed in parallel; the computation is read-only.
pub fn pairwise_distances(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
    debug_assert_eq!(a.ncols(), b.ncols());
    let rows: Vec<Vec<f64>> = (0..a.nrows())
        .into_par_iter()
        .map(|i| {
            let ai = a.row(i);
            (0..b.nrows())
                .map(|j| {
                    let mut d = 0.0;
                    for (x, y) in ai.iter().zip(b.row(j).iter()) {
                        let diff = x - y;
                        d += diff * diff;
                    }
                    d.sqrt()
                })
                .collect()
        })
        .collect();

    let mut out = Array2::zeros((a.nrows(), b.nrows()));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, d) in row.into_iter().enumerate() {
            out[[i, j]] = d;
        }
    }
    out
}

/// Majority-vote classifier over the k nearest stored points.
///
/// Fitting stores the training set; prediction is a linear scan. That is the
/// right trade-off here: classifiers live inside tree nodes and are queried
/// with single observations.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    points: Array2<f64>,
    labels: Vec<u8>,
    k: usize,
}

impl KnnClassifier {
    /// Store `points` with binary `labels`. `k` is clamped to the number of
    /// points.
    pub fn fit(points: Array2<f64>, labels: Vec<u8>, k: usize) -> Self {
        debug_assert_eq!(points.nrows(), labels.len());
        let k = k.clamp(1, points.nrows().max(1));
        Self { points, labels, k }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Predict the label of one observation: majority among the k nearest
    /// training points, ties broken towards 0.
    pub fn predict(&self, x: ArrayView1<'_, f64>) -> u8 {
        let mut dists: Vec<(f64, u8)> = self
            .points
            .outer_iter()
            .zip(&self.labels)
            .map(|(p, &l)| {
                let mut d = 0.0;
                for (a, b) in p.iter().zip(x.iter()) {
                    let diff = a - b;
                    d += diff * diff;
                }
                (d, l)
            })
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let ones: usize = dists[..self.k].iter().filter(|&&(_, l)| l == 1).count();
        u8::from(2 * ones > self.k)
    }

    /// Predict every row of a batch.
    pub fn predict_batch(&self, x: ArrayView2<'_, f64>) -> Vec<u8> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict(x.row(i)))
            .collect()
    }
}
