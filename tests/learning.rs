//! End-to-end learning tests on synthetic observation streams.

use worldmodel::testing::{four_cluster_cycle, two_cluster_chain, two_cluster_controlled};
use worldmodel::{
    mutual_information, GainMeasure, ModelConfig, ModelError, StrategyKind, Verbosity, WorldModel,
};

fn grid_config() -> ModelConfig {
    ModelConfig::builder()
        .strategy(StrategyKind::Grid)
        .verbosity(Verbosity::Silent)
        .build()
}

#[test]
fn two_cluster_chain_learns_two_states() {
    let (observations, actions) = two_cluster_chain(1000, 42);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();

    assert_eq!(model.n_states(0).unwrap(), 2);
    model.validate().unwrap();

    // dwelling walk: self-transitions dominate the off-diagonal mass
    let m = model.partitioning(0).unwrap().merged_transition_matrix();
    assert_eq!(m.sum(), 999);
    let diagonal = m[[0, 0]] + m[[1, 1]];
    let off = m[[0, 1]] + m[[1, 0]];
    assert!(
        diagonal > 4 * off,
        "self-transitions {diagonal} should dominate {off}"
    );
}

#[test]
fn four_cluster_cycle_learns_four_states_with_full_information() {
    let (observations, actions) = four_cluster_cycle(2000, 13);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    // exploratory splitting: accept any nonnegative gain, as the first cut
    // of a cycle carries no information by itself
    model.learn(-0.1, 0.01).unwrap();

    assert_eq!(model.n_states(0).unwrap(), 4);
    model.validate().unwrap();

    let merged = model
        .partitioning(0)
        .unwrap()
        .merged_transition_matrix()
        .mapv(|c| c as f64);
    let mi = mutual_information(merged.view()).unwrap();
    assert!(
        (mi - 2.0).abs() < 0.05,
        "cyclic 4-state chain carries log2(4) bits, got {mi}"
    );
}

#[test]
fn classification_reproduces_the_applied_partition() {
    let (observations, actions) = two_cluster_chain(1000, 7);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();

    let partitioning = model.partitioning(0).unwrap();
    // per-leaf data must classify back to exactly its own state
    for (index, labels) in (0..partitioning.num_states()).map(|i| {
        let data = model.leaf_data(0, i).unwrap();
        (i, model.classify(0, data.view()).unwrap())
    }) {
        assert!(
            labels.iter().all(|&l| l == index),
            "leaf {index} data drifted to {labels:?}"
        );
    }

    // and the stored label vector agrees with fresh classification
    let fresh = model.classify(0, model.store().view()).unwrap();
    assert_eq!(fresh, partitioning.labels());
}

#[test]
fn classify_is_idempotent() {
    let (observations, actions) = two_cluster_chain(600, 3);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations.clone(), &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();

    let once = model.classify(0, observations.view()).unwrap();
    let twice = model.classify(0, observations.view()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn two_actions_learn_independent_views() {
    let (observations, actions) = two_cluster_controlled(2000, 21);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();
    model.validate().unwrap();

    assert_eq!(model.known_actions(), vec![0, 1]);
    for action in [0, 1] {
        assert_eq!(model.n_states(action).unwrap(), 2, "action {action}");
    }

    // under either view: action 0 stays put, action 1 swaps clusters
    let partitioning = model.partitioning(0).unwrap();
    let stay = partitioning.transitions().matrix_or_zeros(0);
    let swap = partitioning.transitions().matrix_or_zeros(1);
    assert!(stay[[0, 0]] + stay[[1, 1]] > 10 * (stay[[0, 1]] + stay[[1, 0]]));
    assert!(swap[[0, 1]] + swap[[1, 0]] > 10 * (swap[[0, 0]] + swap[[1, 1]]));
}

#[test]
fn transition_totals_are_conserved_through_learning() {
    let (observations, actions) = two_cluster_controlled(1500, 5);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();

    let expected = model.store().known_transitions();
    assert_eq!(expected, 1499);

    model.learn(0.01, 0.01).unwrap();
    for action in model.known_actions() {
        let partitioning = model.partitioning(action).unwrap();
        assert_eq!(partitioning.transitions().total(), expected);
        // every state label in 0..K appears
        let k = partitioning.num_states();
        let mut seen = vec![false; k];
        for &label in partitioning.labels() {
            seen[label] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}

#[test]
fn global_gain_measure_also_finds_the_structure() {
    let (observations, actions) = two_cluster_chain(1000, 11);
    let config = ModelConfig::builder()
        .strategy(StrategyKind::Grid)
        .gain_measure(GainMeasure::Global)
        .verbosity(Verbosity::Silent)
        .build();
    let mut model = WorldModel::new(config).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();

    assert_eq!(model.n_states(0).unwrap(), 2);
    model.validate().unwrap();
}

#[test]
fn stats_trace_the_learning_curve() {
    let (observations, actions) = two_cluster_chain(1000, 17);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();

    let stats = model.stats();
    // initial snapshot plus one per applied split
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].n_states, 1);
    assert_eq!(stats[1].n_states, 2);
    assert!(stats[1].mutual_information > stats[0].mutual_information);
    assert!(stats[1].n_nodes > stats[0].n_nodes);
}

#[test]
fn merge_phase_stays_disabled_by_default() {
    let (observations, actions) = two_cluster_chain(1000, 19);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    // a huge cost ceiling would merge everything if the phase ran
    model.learn(0.01, f64::INFINITY).unwrap();
    assert_eq!(model.n_states(0).unwrap(), 2);
}

#[test]
fn enabled_merge_phase_folds_states_back() {
    let (observations, actions) = two_cluster_chain(1000, 23);
    let config = ModelConfig::builder()
        .strategy(StrategyKind::Grid)
        .merge_rounds(1)
        .verbosity(Verbosity::Silent)
        .build();
    let mut model = WorldModel::new(config).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, f64::INFINITY).unwrap();

    // the split happens, then the single merge round folds it back
    assert_eq!(model.n_states(0).unwrap(), 1);
    model.validate().unwrap();
    let stats = model.stats();
    assert_eq!(stats.last().unwrap().n_states, 1);
}

#[test]
fn incremental_data_keeps_historical_assignment() {
    let (observations, actions) = two_cluster_chain(1000, 29);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations, &actions).unwrap();
    model.learn(0.01, 0.01).unwrap();
    let labels_before = model.partitioning(0).unwrap().labels().to_vec();

    let (more, more_actions) = two_cluster_chain(200, 31);
    model.add_data(more, &more_actions).unwrap();
    model.validate().unwrap();

    // old observations keep their states; only new ones were appended
    let labels_after = model.partitioning(0).unwrap().labels();
    assert_eq!(&labels_after[..1000], labels_before.as_slice());
    assert_eq!(labels_after.len(), 1200);
}

#[test]
fn unknown_action_is_reported() {
    let (observations, actions) = two_cluster_chain(100, 37);
    let mut model = WorldModel::new(grid_config()).unwrap();
    model.add_data(observations.clone(), &actions).unwrap();
    assert!(matches!(
        model.classify(5, observations.view()),
        Err(ModelError::UnknownAction(5))
    ));
}

#[test]
fn spectral_strategy_learns_the_alternating_chain() {
    // strictly alternating clusters defeat axis cuts scored on dwell
    // structure; the spectral cut finds the bipartition directly
    let config = ModelConfig::builder()
        .strategy(StrategyKind::Spectral {
            k_neighbors: 10,
            classifier_k: 10,
            max_nodes: 256,
        })
        .min_split_samples(20)
        .verbosity(Verbosity::Silent)
        .build();
    let mut model = WorldModel::new(config).unwrap();

    // deterministic alternation between two clusters
    let n = 120;
    let mut data = ndarray::Array2::zeros((n, 2));
    let mut x = 5.0_f64;
    for i in 0..n {
        x = (x * 16807.0) % 2147483647.0;
        let jitter = (x / 2147483647.0 - 0.5) * 0.4;
        data[[i, 0]] = if i % 2 == 0 { -3.0 } else { 3.0 } + jitter;
        data[[i, 1]] = jitter;
    }
    model.add_data(data, &vec![0; n]).unwrap();
    model.learn(0.05, 0.05).unwrap();

    assert_eq!(model.n_states(0).unwrap(), 2);
    model.validate().unwrap();
    // alternation: the merged matrix is anti-diagonal
    let m = model.partitioning(0).unwrap().merged_transition_matrix();
    assert_eq!(m[[0, 0]] + m[[1, 1]], 0);
}
