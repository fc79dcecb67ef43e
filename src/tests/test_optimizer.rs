use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::optimizer::{kl_placement_cost, NelderMead, Termination};
use crate::tests::test_helpers::random_coords;

#[test]
fn test_minimize_quadratic() {
    let nm = NelderMead::new(500);
    let m = nm.minimize(|x| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2), &[0.0, 0.0]);
    assert_eq!(m.termination, Termination::Converged);
    assert!((m.x[0] - 1.0).abs() < 1e-3);
    assert!((m.x[1] + 2.0).abs() < 1e-3);
    assert!(m.cost < 1e-6);
}

#[test]
fn test_minimize_rosenbrock() {
    let rosen = |x: &[f64]| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2);
    let m = NelderMead::new(2000).minimize(rosen, &[-1.2, 1.0]);
    assert_eq!(m.termination, Termination::Converged);
    assert!((m.x[0] - 1.0).abs() < 1e-2);
    assert!((m.x[1] - 1.0).abs() < 1e-2);
}

#[test]
fn test_iteration_and_evaluation_limits() {
    let f = |x: &[f64]| (x[0] - 10.0).powi(2) + (x[1] - 10.0).powi(2);

    let m = NelderMead::new(3).minimize(f, &[0.0, 0.0]);
    assert_eq!(m.termination, Termination::MaxIterations);
    assert_eq!(m.termination.code(), 2);
    assert_eq!(m.iterations, 3);

    let m = NelderMead::new(1000).with_max_evals(5).minimize(f, &[0.0, 0.0]);
    assert_eq!(m.termination, Termination::MaxEvaluations);
    assert_eq!(m.termination.code(), 1);
    assert!(m.evaluations >= 5);

    assert_eq!(Termination::Converged.code(), 0);
}

#[test]
fn test_single_neighbour_cost_is_flat() {
    // with one neighbour and p = 1 both terms cancel everywhere
    let z = [[3.0, -1.0]];
    for x in [[0.0, 0.0], [3.0, -1.0], [-7.5, 2.0]] {
        assert_relative_eq!(kl_placement_cost(&x, &z, &[1.0]), 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_cost_prefers_high_affinity_neighbour() {
    let z = [[0.0, 0.0], [10.0, 0.0]];
    let p = [0.9, 0.1];
    let near_heavy = kl_placement_cost(&[0.5, 0.0], &z, &p);
    let near_light = kl_placement_cost(&[9.5, 0.0], &z, &p);
    assert!(near_heavy < near_light);
}

#[test]
fn test_place_never_worsens_the_guess() {
    let mut rng = StdRng::seed_from_u64(77);
    let nm = NelderMead::default();
    for seed in 0..25 {
        let z = random_coords(15, 5.0, seed);
        let raw: Vec<f64> = (0..15).map(|_| rng.random_range(0.01..1.0)).collect();
        let total: f64 = raw.iter().sum();
        let p: Vec<f64> = raw.iter().map(|w| w / total).collect();
        let guess = z[0];

        let start = kl_placement_cost(&guess, &z, &p);
        let (pos, cost, _) = nm.place(guess, &z, &p);
        assert!(cost <= start + 1e-12);
        assert_relative_eq!(cost, kl_placement_cost(&pos, &z, &p), epsilon = 1e-12);
    }
}
