//! Small dense linear-algebra kernels.
//!
//! Everything here operates on modest matrices (expanded feature dimensions,
//! neighborhood graphs of a single leaf) where a simple exact implementation
//! beats pulling in a full LAPACK binding. Contracts are documented per
//! function; callers treat these as library calls.

mod covariance;
mod eigen;
mod expansion;
mod knn;

pub use covariance::Covariance;
pub use eigen::{generalized_eig_largest, sym_eig, whitening, MAX_SWEEPS};
pub use expansion::PolynomialExpansion;
pub use knn::{pairwise_distances, KnnClassifier};
