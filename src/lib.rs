//! worldmodel: discrete-state world models from continuous observation
//! streams.
//!
//! The model recursively bi-partitions the feature space with a binary tree
//! so that the induced symbolic Markov chains — one transition matrix per
//! action — carry maximal mutual information between consecutive states.
//! Splitting is greedy: every leaf of every action's partitioning proposes a
//! candidate cut, the candidate with the highest information gain is
//! applied, and the loop repeats until no candidate clears the threshold.
//!
//! # Key Types
//!
//! - [`WorldModel`] - owns the data stream and drives learning
//! - [`ModelConfig`] - configuration builder (strategy, gain measure,
//!   thresholds)
//! - [`Partitioning`] - one action's tree + labels + transition matrices
//! - [`StrategyKind`] - grid, spectral, or whitened-covariance split tests
//! - [`Stats`] - learning-curve snapshots
//!
//! # Example
//!
//! ```
//! use worldmodel::{ModelConfig, StrategyKind, Verbosity, WorldModel};
//! use worldmodel::testing::two_cluster_chain;
//!
//! let config = ModelConfig::builder()
//!     .strategy(StrategyKind::Grid)
//!     .verbosity(Verbosity::Silent)
//!     .build();
//! let mut model = WorldModel::new(config).unwrap();
//!
//! let (observations, actions) = two_cluster_chain(400, 7);
//! model.add_data(observations, &actions).unwrap();
//! model.learn(0.01, 0.01).unwrap();
//!
//! assert_eq!(model.n_states(0).unwrap(), 2);
//! ```

// Re-export approx for downstream tests that compare model quantities
pub use approx;

pub mod data;
pub mod error;
pub mod info;
pub mod linalg;
pub mod model;
pub mod partition;
pub mod strategy;
pub mod testing;
pub mod transitions;
pub mod tree;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use data::{Action, ObservationStore};
pub use error::{ModelError, SplitError};
pub use info::{entropy, matrix_entropy, mutual_information};
pub use model::{GainMeasure, ModelConfig, ModelLogger, Stats, StrategyKind, Verbosity, WorldModel};
pub use partition::{Partitioning, SplitCandidate};
pub use strategy::{SplitStrategy, TestParams, WhitenedVariant};
pub use transitions::TransitionStore;
pub use tree::{NodeId, Tree};
