//! The model driver.
//!
//! [`WorldModel`] owns the shared observation/action store, one
//! [`Partitioning`] per known action, and the greedy learning loop:
//! evaluate a split candidate for every eligible leaf across every
//! partitioning, apply the single best one, repeat until no candidate clears
//! the gain threshold. All mutation is strictly sequential.

mod config;
mod logger;
mod stats;

pub use config::{GainMeasure, ModelConfig, StrategyKind};
pub use logger::{ModelLogger, Verbosity};
pub use stats::{calc_stats, Stats};

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{Action, ObservationStore};
use crate::error::ModelError;
use crate::partition::Partitioning;
use crate::strategy::SplitStrategy;
use crate::tree::NodeId;

/// Discrete-state world model learned from a continuous observation stream.
///
/// ```
/// use ndarray::Array2;
/// use worldmodel::{ModelConfig, WorldModel};
///
/// let mut model = WorldModel::new(ModelConfig::default()).unwrap();
/// let observations = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 0.1, 0.9]).unwrap();
/// model.add_data(observations, &[0, 0, 0]).unwrap();
/// model.learn(0.02, 0.02).unwrap();
/// ```
#[derive(Debug)]
pub struct WorldModel {
    config: ModelConfig,
    strategy: Box<dyn SplitStrategy>,
    logger: ModelLogger,
    store: ObservationStore,
    partitionings: BTreeMap<Action, Partitioning>,
    stats: Vec<Stats>,
    rng: Xoshiro256PlusPlus,
}

impl WorldModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let strategy = config.build_strategy();
        let logger = ModelLogger::new(config.verbosity);
        let rng = Xoshiro256PlusPlus::seed_from_u64(config.merge_seed);
        Ok(Self {
            config,
            strategy,
            logger,
            store: ObservationStore::new(),
            partitionings: BTreeMap::new(),
            stats: Vec::new(),
            rng,
        })
    }

    /// Append a batch of observations and the actions that produced them.
    ///
    /// `actions` holds one entry per observation (the action taken towards
    /// the *next* observation) or one less, in which case the batch's
    /// outgoing boundary action is unknown and excluded from all counts.
    ///
    /// New observations are classified against the current trees before
    /// being appended, so state assignment of historical data never changes
    /// here — only future splits move labels.
    pub fn add_data(
        &mut self,
        observations: Array2<f64>,
        actions: &[Action],
    ) -> Result<(), ModelError> {
        if observations.nrows() == 0 {
            return Ok(());
        }

        // classify against the pre-append trees
        let mut classified: Vec<(Action, Vec<usize>)> = Vec::new();
        for (&action, partitioning) in &self.partitionings {
            classified.push((action, partitioning.classify(observations.view())));
        }

        let first_new = self.store.append(observations, actions)?;

        for (action, labels) in classified {
            let partitioning = self
                .partitionings
                .get_mut(&action)
                .expect("partitioning existed before append");
            partitioning.extend(labels, &self.store, first_new)?;
        }

        // newly seen actions get their own fresh view over everything
        for &action in self.store.known_actions() {
            if !self.partitionings.contains_key(&action) {
                self.partitionings
                    .insert(action, Partitioning::new(&self.store, action));
            }
        }

        self.logger.debug(&format!(
            "added data: {} observations total, {} actions",
            self.store.len(),
            self.partitionings.len()
        ));
        Ok(())
    }

    /// State labels of a batch under one action's partitioning. Pure query;
    /// calling it twice returns identical labels.
    pub fn classify(
        &self,
        action: Action,
        observations: ArrayView2<'_, f64>,
    ) -> Result<Vec<usize>, ModelError> {
        if !self.store.is_empty() && observations.ncols() != self.store.dim() {
            return Err(ModelError::DimMismatch {
                expected: self.store.dim(),
                got: observations.ncols(),
            });
        }
        let partitioning = self
            .partitionings
            .get(&action)
            .ok_or(ModelError::UnknownAction(action))?;
        Ok(partitioning.classify(observations))
    }

    /// Drive the learning loop to completion: split while the best candidate
    /// gains at least `min_gain`, then run the (by default zero) merge
    /// rounds with cost ceiling `max_merge_cost`.
    pub fn learn(&mut self, min_gain: f64, max_merge_cost: f64) -> Result<(), ModelError> {
        if self.partitionings.is_empty() {
            self.logger.warn("learn called before any data was added");
            return Ok(());
        }
        if self.stats.is_empty() {
            let first = *self
                .partitionings
                .keys()
                .next()
                .expect("partitionings are non-empty");
            let snapshot = self.snapshot(first)?;
            self.stats.push(snapshot);
        }

        while let Some((action, gain)) = self.single_split_step(min_gain)? {
            self.logger
                .debug(&format!("applied split on action {action} with gain {gain:.4}"));
        }
        self.merge_phase(max_merge_cost)
    }

    /// One evaluate–select–apply round. Returns the applied `(action, gain)`
    /// or `None` when no candidate reaches `min_gain`.
    fn single_split_step(
        &mut self,
        min_gain: f64,
    ) -> Result<Option<(Action, f64)>, ModelError> {
        let store = &self.store;
        let config = &self.config;
        let strategy = self.strategy.as_ref();
        let logger = &self.logger;

        let mut best: Option<(Action, NodeId, f64)> = None;
        for (&action, partitioning) in self.partitionings.iter_mut() {
            if let Some((leaf, gain)) =
                partitioning.best_candidate(store, config, strategy, logger)?
            {
                if best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((action, leaf, gain));
                }
            }
        }

        match best {
            Some((action, leaf, gain)) if gain >= min_gain => {
                let partitioning = self
                    .partitionings
                    .get_mut(&action)
                    .expect("chosen partitioning exists");
                let applied = partitioning.apply_split(&self.store, &self.config, leaf)?;
                let n_states = partitioning.num_states();
                let snapshot = calc_stats(
                    &partitioning.merged_transition_matrix(),
                    partitioning.tree().num_nodes(),
                )?;
                self.stats.push(snapshot);
                self.logger
                    .log_round(self.stats.len() - 1, action, applied, n_states);
                Ok(Some((action, applied)))
            }
            Some((_, _, gain)) => {
                self.logger
                    .debug(&format!("best gain {gain:.4} below threshold {min_gain:.4}"));
                Ok(None)
            }
            None => {
                self.logger.debug("no evaluable split candidates left");
                Ok(None)
            }
        }
    }

    /// The merge phase. Designed but unscheduled: `merge_rounds` defaults to
    /// zero, and the cost threshold has not been validated end to end. Each
    /// round samples sibling-leaf pairs, folds the cheapest one if its
    /// mutual-information cost stays within `max_cost`, and stops otherwise.
    fn merge_phase(&mut self, max_cost: f64) -> Result<(), ModelError> {
        for round in 0..self.config.merge_rounds {
            let mut best: Option<(Action, NodeId, f64)> = None;
            for (&action, partitioning) in &self.partitionings {
                if partitioning.num_states() < 2 {
                    continue;
                }
                let parents = partitioning.tree().sibling_leaf_parents();
                let sampled: Vec<NodeId> = parents
                    .choose_multiple(&mut self.rng, self.config.merge_samples)
                    .copied()
                    .collect();
                for parent in sampled {
                    let cost = partitioning.merge_cost(parent)?;
                    if best.map_or(true, |(_, _, c)| cost < c) {
                        best = Some((action, parent, cost));
                    }
                }
            }
            match best {
                Some((action, parent, cost)) if cost <= max_cost => {
                    let partitioning = self
                        .partitionings
                        .get_mut(&action)
                        .expect("chosen partitioning exists");
                    partitioning.apply_merge(parent)?;
                    let snapshot = calc_stats(
                        &partitioning.merged_transition_matrix(),
                        partitioning.tree().num_nodes(),
                    )?;
                    self.stats.push(snapshot);
                    self.logger.info(&format!(
                        "merge round {round}: folded states on action {action}, cost {cost:.4}"
                    ));
                }
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    fn snapshot(&self, action: Action) -> Result<Stats, ModelError> {
        let partitioning = self
            .partitionings
            .get(&action)
            .ok_or(ModelError::UnknownAction(action))?;
        calc_stats(
            &partitioning.merged_transition_matrix(),
            partitioning.tree().num_nodes(),
        )
    }

    // ------------------------------------------------------------------
    // read-only queries
    // ------------------------------------------------------------------

    /// Number of stored observations.
    pub fn n_samples(&self) -> usize {
        self.store.len()
    }

    /// Feature dimension, 0 before any data.
    pub fn input_dim(&self) -> usize {
        self.store.dim()
    }

    /// Actions with a partitioning, ascending.
    pub fn known_actions(&self) -> Vec<Action> {
        self.partitionings.keys().copied().collect()
    }

    /// One action's full partitioning (tree, labels, matrices).
    pub fn partitioning(&self, action: Action) -> Result<&Partitioning, ModelError> {
        self.partitionings
            .get(&action)
            .ok_or(ModelError::UnknownAction(action))
    }

    /// Number of states in one action's partitioning.
    pub fn n_states(&self, action: Action) -> Result<usize, ModelError> {
        Ok(self.partitioning(action)?.num_states())
    }

    /// The observations owned by one leaf of one action's partitioning.
    pub fn leaf_data(&self, action: Action, leaf_index: usize) -> Result<Array2<f64>, ModelError> {
        let partitioning = self.partitioning(action)?;
        let leaves = partitioning.tree().leaves();
        let leaf = *leaves
            .get(leaf_index)
            .ok_or_else(|| ModelError::invariant(format!("no leaf {leaf_index}")))?;
        Ok(self
            .store
            .rows_for(&partitioning.tree().node(leaf).data_refs))
    }

    /// The learning curve: one snapshot before learning plus one per applied
    /// split or merge.
    pub fn stats(&self) -> &[Stats] {
        &self.stats
    }

    /// The shared observation/action store.
    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    /// Check every partitioning's structural invariants.
    pub fn validate(&self) -> Result<(), ModelError> {
        for partitioning in self.partitionings.values() {
            partitioning.validate(&self.store)?;
        }
        Ok(())
    }
}
