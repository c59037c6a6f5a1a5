//! Model configuration.

use bon::Builder;

use crate::error::ModelError;
use crate::strategy::{
    GridSplit, SpectralSplit, SplitStrategy, WhitenedSplit, WhitenedVariant,
};

use super::logger::Verbosity;

/// Which gain measure scores split candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMeasure {
    /// Blended mutual information of the 2x2 matrices induced on the leaf's
    /// strict transitions. Cheap, index-independent, the default.
    Local,
    /// Whole-model mutual information after minus before the split.
    Global,
}

/// Which split-test strategy the model uses. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyKind {
    /// Axis-parallel midpoint cuts of the inherited bounding box.
    Grid,
    /// Spectral bi-partition of the leaf's transition graph plus a k-NN
    /// classifier.
    Spectral {
        k_neighbors: usize,
        classifier_k: usize,
        max_nodes: usize,
    },
    /// Whitened-covariance projection cut.
    Whitened {
        variant: WhitenedVariant,
        degree: usize,
    },
}

impl StrategyKind {
    /// Spectral cut with default parameters.
    pub fn spectral() -> Self {
        let d = SpectralSplit::default();
        StrategyKind::Spectral {
            k_neighbors: d.k_neighbors,
            classifier_k: d.classifier_k,
            max_nodes: d.max_nodes,
        }
    }

    /// Whitened delta cut with default parameters.
    pub fn whitened() -> Self {
        let d = WhitenedSplit::default();
        StrategyKind::Whitened {
            variant: d.variant,
            degree: d.degree,
        }
    }
}

/// Configuration of a [`WorldModel`](super::WorldModel).
///
/// Built with the generated builder; unspecified fields take the defaults
/// listed per field.
///
/// ```
/// use worldmodel::{GainMeasure, ModelConfig, StrategyKind};
///
/// let config = ModelConfig::builder()
///     .strategy(StrategyKind::Grid)
///     .gain_measure(GainMeasure::Local)
///     .min_split_samples(20)
///     .build();
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ModelConfig {
    /// Split-test strategy. Default: grid cuts.
    #[builder(default = StrategyKind::Grid)]
    pub strategy: StrategyKind,

    /// Gain measure scoring candidates. Default: local.
    #[builder(default = GainMeasure::Local)]
    pub gain_measure: GainMeasure,

    /// Additive smoothing added to every cell of a scored transition matrix.
    /// Guards the gain against a handful of lucky samples. Default: 10.
    #[builder(default = 10.0)]
    pub uncertainty_bias: f64,

    /// Scale of the identity prior inside the whitened-covariance strategy.
    /// Default: 100.
    #[builder(default = 100.0)]
    pub uncertainty_prior: f64,

    /// Convex weight towards the other actions' covariance in the
    /// neighbor-delta whitened cut. Default: 0 (pure active covariance).
    #[builder(default = 0.0)]
    pub factorization_weight: f64,

    /// Strict transitions (for the partitioning's active action) a leaf
    /// needs before it is considered for splitting. Default: 50.
    #[builder(default = 50)]
    pub min_split_samples: usize,

    /// Merge rounds after splitting finishes. The merge path is kept
    /// correct but unscheduled; leave at 0 unless you have validated it for
    /// your data. Default: 0.
    #[builder(default = 0)]
    pub merge_rounds: usize,

    /// Sibling pairs sampled per merge round. Default: 250.
    #[builder(default = 250)]
    pub merge_samples: usize,

    /// Seed of the merge-phase pair sampler. Default: fixed.
    #[builder(default = 0x5EED_CAFE)]
    pub merge_seed: u64,

    /// Logging verbosity. Default: warnings only.
    #[builder(default = Verbosity::Warning)]
    pub verbosity: Verbosity,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::builder().build()
    }
}

impl ModelConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.uncertainty_bias < 0.0 {
            return Err(ModelError::invariant("uncertainty_bias must be >= 0"));
        }
        if self.uncertainty_prior < 0.0 {
            return Err(ModelError::invariant("uncertainty_prior must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.factorization_weight) {
            return Err(ModelError::invariant(
                "factorization_weight must be in [0, 1]",
            ));
        }
        if self.min_split_samples == 0 {
            return Err(ModelError::invariant("min_split_samples must be >= 1"));
        }
        if let StrategyKind::Whitened { degree, .. } = self.strategy {
            if degree == 0 {
                return Err(ModelError::invariant("expansion degree must be >= 1"));
            }
        }
        Ok(())
    }

    /// Instantiate the configured strategy.
    pub(crate) fn build_strategy(&self) -> Box<dyn SplitStrategy> {
        match self.strategy {
            StrategyKind::Grid => Box::new(GridSplit),
            StrategyKind::Spectral {
                k_neighbors,
                classifier_k,
                max_nodes,
            } => Box::new(SpectralSplit {
                k_neighbors,
                classifier_k,
                max_nodes,
                ..Default::default()
            }),
            StrategyKind::Whitened { variant, degree } => Box::new(WhitenedSplit {
                variant,
                degree,
                uncertainty_prior: self.uncertainty_prior,
                factorization_weight: self.factorization_weight,
                ..Default::default()
            }),
        }
    }
}
