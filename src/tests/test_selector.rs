use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bandwidth::BandwidthSolver;
use crate::config::MotionParams;
use crate::core::{normalise_rows, TrainingSet};
use crate::divergence::list_kl_divergences;
use crate::error::MotionError;
use crate::optimizer::{kl_placement_cost, Termination};
use crate::selector::{initial_guesses, select_candidate, Candidate, CandidateKind, CandidateSelector};
use crate::tests::init;
use crate::tests::test_helpers::{clustered_training, dist};
use smartcore::linalg::basic::arrays::Array2;

fn candidate(kind: CandidateKind, cost: f64, in_hull: bool) -> Candidate {
    Candidate {
        kind,
        guess: [0.0, 0.0],
        position: [cost, cost],
        cost,
        termination: Termination::Converged,
        in_hull,
    }
}

#[test]
fn test_initial_guesses() {
    let z = [[0.0, 0.0], [2.0, 0.0], [0.0, 4.0]];
    let w = [0.25, 0.25, 0.5];
    let [centroid, best] = initial_guesses(&z, &w);
    assert_eq!(centroid, [0.5, 2.0]);
    assert_eq!(best, [0.0, 4.0]);
}

#[test]
fn test_single_in_hull_candidate_always_wins() {
    // property: cost of the out-of-hull candidate is irrelevant
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..200 {
        let a = rng.random_range(-10.0..10.0);
        let b = rng.random_range(-10.0..10.0);
        let inside_first = rng.random_bool(0.5);
        let cands = [
            candidate(CandidateKind::WeightedCentroid, a, inside_first),
            candidate(CandidateKind::MaxAffinity, b, !inside_first),
        ];
        let (idx, in_hull) = select_candidate(&cands);
        assert!(in_hull);
        assert_eq!(idx, if inside_first { 0 } else { 1 });
    }
}

#[test]
fn test_lowest_cost_among_in_hull() {
    let cands = [
        candidate(CandidateKind::WeightedCentroid, 2.0, true),
        candidate(CandidateKind::MaxAffinity, 1.0, true),
    ];
    assert_eq!(select_candidate(&cands), (1, true));
}

#[test]
fn test_lowest_cost_overall_when_none_in_hull() {
    let cands = [
        candidate(CandidateKind::WeightedCentroid, -1.0, false),
        candidate(CandidateKind::MaxAffinity, 1.0, false),
    ];
    assert_eq!(select_candidate(&cands), (0, false));
}

#[test]
fn test_ties_go_to_the_first_candidate() {
    let cands = [
        candidate(CandidateKind::WeightedCentroid, 1.0, true),
        candidate(CandidateKind::MaxAffinity, 1.0, true),
    ];
    assert_eq!(select_candidate(&cands), (0, true));
}

#[test]
fn test_place_training_point_lands_near_its_coordinate() {
    init();
    let (training, _, _) = clustered_training(20, 3);
    let params = MotionParams::default().with_bandwidth(8.0, 50, 1e-5);
    let selector = CandidateSelector::from_params(&training, &params);

    let query = vec![training.row(7).to_vec()];
    let d = list_kl_divergences(&query, training.data());
    let row: Vec<f64> = d.get_row(0).iterator(0).copied().collect();
    let placement = selector.place(&row).unwrap();

    assert!(!placement.degenerate);
    assert!(placement.cost.is_finite());
    assert!(dist(placement.position, training.coord(7)) < 4.0);
}

#[test]
fn test_too_few_neighbours_fall_back_to_guess() {
    // three collinear training points: the neighbourhood can never be triangulated
    let rows = normalise_rows(&[vec![1.0, 2.0], vec![2.0, 1.0], vec![1.5, 1.5]]).unwrap();
    let training = TrainingSet::new(rows, vec![[0.0, 0.0], [2.0, 2.0], [1.0, 1.0]]).unwrap();
    let params = MotionParams::default().with_bandwidth(1.5, 3, 1e-6);
    let selector = CandidateSelector::from_params(&training, &params);

    let d = list_kl_divergences(&[vec![0.45, 0.55]], training.data());
    let row: Vec<f64> = d.get_row(0).iterator(0).copied().collect();
    let placement = selector.place(&row).unwrap();

    assert!(placement.degenerate);
    assert!(!placement.in_hull);
    assert_eq!(placement.position, placement.guess);

    // the reported cost is measured where the point was placed
    let bandwidth = BandwidthSolver::from_params(&params).solve(&row).unwrap();
    let (_, z, w) = training.positive_neighbours(&bandwidth.p);
    assert_eq!(placement.cost, kl_placement_cost(&placement.position, &z, &w));
}

#[test]
fn test_place_checks_row_length() {
    let (training, _, _) = clustered_training(5, 1);
    let selector = CandidateSelector::from_params(&training, &MotionParams::default());
    assert!(matches!(
        selector.place(&[0.1, 0.2]),
        Err(MotionError::DimensionMismatch { expected: 20, got: 2 })
    ));
}
