//! Testing utilities: assertion helpers and deterministic synthetic
//! observation streams.
//!
//! The generators are available to integration tests and benchmarks; they
//! are not part of the model itself.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::Action;

/// Default tolerance for floating point comparisons in tests.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Assert that two floats are approximately equal.
///
/// ```
/// # use worldmodel::assert_approx_eq;
/// assert_approx_eq!(1.0_f64, 1.0 + 1e-12, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val = $left;
        let right_val = $right;
        let tol = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
}

fn gauss(rng: &mut Xoshiro256PlusPlus) -> f64 {
    // Box-Muller
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// A walk dwelling in one of two well-separated 2-D clusters, switching with
/// probability 0.1 per step. Single action. Self-transitions dominate.
pub fn two_cluster_chain(n: usize, seed: u64) -> (Array2<f64>, Vec<Action>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let means = [[-3.0, 0.0], [3.0, 0.0]];
    let sigma = 0.2;

    let mut data = Array2::zeros((n, 2));
    let mut state = 0usize;
    for i in 0..n {
        data[[i, 0]] = means[state][0] + sigma * gauss(&mut rng);
        data[[i, 1]] = means[state][1] + sigma * gauss(&mut rng);
        if rng.gen::<f64>() < 0.1 {
            state = 1 - state;
        }
    }
    (data, vec![0; n])
}

/// A deterministic cycle through four well-separated clusters on the
/// corners of a square. Single action. The merged transition matrix of a
/// perfect 4-state model is a cyclic permutation.
pub fn four_cluster_cycle(n: usize, seed: u64) -> (Array2<f64>, Vec<Action>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let means = [[-2.0, -2.0], [-2.0, 2.0], [2.0, 2.0], [2.0, -2.0]];
    let sigma = 0.3;

    let mut data = Array2::zeros((n, 2));
    for i in 0..n {
        let m = means[i % 4];
        data[[i, 0]] = m[0] + sigma * gauss(&mut rng);
        data[[i, 1]] = m[1] + sigma * gauss(&mut rng);
    }
    (data, vec![0; n])
}

/// Two clusters under two actions: action 0 stays in the current cluster,
/// action 1 jumps to the other. Actions are chosen uniformly at random.
pub fn two_cluster_controlled(n: usize, seed: u64) -> (Array2<f64>, Vec<Action>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let means = [[-3.0, 0.0], [3.0, 0.0]];
    let sigma = 0.2;

    let mut data = Array2::zeros((n, 2));
    let mut actions = Vec::with_capacity(n);
    let mut state = 0usize;
    for i in 0..n {
        data[[i, 0]] = means[state][0] + sigma * gauss(&mut rng);
        data[[i, 1]] = means[state][1] + sigma * gauss(&mut rng);
        let action: Action = rng.gen_range(0..2);
        if action == 1 {
            state = 1 - state;
        }
        actions.push(action);
    }
    (data, actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_deterministic_per_seed() {
        let (a, _) = two_cluster_chain(50, 7);
        let (b, _) = two_cluster_chain(50, 7);
        assert_eq!(a, b);
        let (c, _) = two_cluster_chain(50, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn two_cluster_chain_stays_near_means() {
        let (data, actions) = two_cluster_chain(500, 1);
        assert_eq!(actions.len(), 500);
        for row in data.outer_iter() {
            assert!(row[0].abs() > 1.0, "x stays near one of the two means");
            assert!(row[1].abs() < 1.5);
        }
    }

    #[test]
    fn four_cluster_cycle_visits_all_corners() {
        let (data, _) = four_cluster_cycle(40, 2);
        for i in 0..40 {
            let m = [[-2.0, -2.0], [-2.0, 2.0], [2.0, 2.0], [2.0, -2.0]][i % 4];
            assert!((data[[i, 0]] - m[0]).abs() < 1.5);
            assert!((data[[i, 1]] - m[1]).abs() < 1.5);
        }
    }

    #[test]
    fn controlled_actions_flip_clusters() {
        let (data, actions) = two_cluster_controlled(200, 3);
        for i in 0..199 {
            let same_side = (data[[i, 0]] > 0.0) == (data[[i + 1, 0]] > 0.0);
            assert_eq!(same_side, actions[i] == 0, "step {i}");
        }
    }
}
