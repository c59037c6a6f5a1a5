//! Incremental covariance accumulation.

use ndarray::{Array1, Array2, ArrayView2};

/// Accumulates second moments over batches of row vectors.
///
/// A prior can be mixed in as pseudo-samples: `add_prior(w)` feeds the rows
/// of `w * I`, which biases the fixed covariance towards a scaled identity
/// and keeps it invertible when few real samples have been seen.
#[derive(Debug, Clone)]
pub struct Covariance {
    sums: Array2<f64>,
    col_sums: Array1<f64>,
    count: f64,
    dim: usize,
}

impl Covariance {
    pub fn new(dim: usize) -> Self {
        Self {
            sums: Array2::zeros((dim, dim)),
            col_sums: Array1::zeros(dim),
            count: 0.0,
            dim,
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn count(&self) -> f64 {
        self.count
    }

    /// Feed the rows of `weight * I` as pseudo-samples.
    pub fn add_prior(&mut self, weight: f64) {
        for i in 0..self.dim {
            self.sums[[i, i]] += weight * weight;
            self.col_sums[i] += weight;
        }
        self.count += self.dim as f64;
    }

    /// Accumulate a batch of row vectors.
    pub fn update(&mut self, batch: ArrayView2<'_, f64>) {
        debug_assert_eq!(batch.ncols(), self.dim);
        self.sums += &batch.t().dot(&batch);
        self.col_sums += &batch.sum_axis(ndarray::Axis(0));
        self.count += batch.nrows() as f64;
    }

    /// Finalize into a covariance matrix.
    ///
    /// `center` subtracts the accumulated mean's outer product; pass `false`
    /// when the fed samples were centered already.
    pub fn fix(&self, center: bool) -> Array2<f64> {
        debug_assert!(self.count > 0.0, "covariance fixed without samples");
        let mut c = &self.sums / self.count;
        if center {
            let mean = &self.col_sums / self.count;
            for i in 0..self.dim {
                for j in 0..self.dim {
                    c[[i, j]] -= mean[i] * mean[j];
                }
            }
        }
        c
    }
}
