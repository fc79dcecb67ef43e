//! Batch coordinator scenarios: activity filtering, ordering, fail-fast and
//! re-embedding of the training points themselves.

use log::info;

use crate::config::{MotionParams, OutOfHullPolicy};
use crate::embedding::{find_embeddings, reports_progress, BatchEmbedder};
use crate::error::MotionError;
use crate::tests::init;
use crate::tests::test_helpers::{clustered_training, dist, random_rows, random_training};

fn open_params() -> MotionParams {
    MotionParams::default()
        .with_activity_threshold(0.0)
        .with_batching(16, 2)
}

#[test]
fn test_fifty_new_points_all_embedded() {
    init();
    let training = random_training(500, 10, 42).into_shared();
    let queries = random_rows(50, 10, 0.0, 1.0, 99);

    let out = find_embeddings(&queries, training, &open_params()).unwrap();

    assert_eq!(out.z.len(), 50);
    assert!(out.z.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    assert_eq!(out.diagnostics.n_embedded(), 50);
    assert_eq!(out.diagnostics.n_unembedded(), 0);
    assert!(out.diagnostics.costs.iter().all(|c| c.is_finite()));
    assert!(out.diagnostics.termination.iter().all(|t| t.is_some()));
}

#[test]
fn test_inactive_rows_get_the_sentinel() {
    init();
    let training = random_training(200, 10, 1).into_shared();
    let mut queries = random_rows(6, 10, 0.5, 1.5, 2);
    queries[2] = vec![0.01; 10];
    queries[5] = vec![0.0; 10];

    let params = MotionParams::default().with_activity_threshold(2.0);
    let out = find_embeddings(&queries, training, &params).unwrap();

    for (i, p) in out.z.iter().enumerate() {
        if i == 2 || i == 5 {
            assert!(p[0].is_nan() && p[1].is_nan(), "row {} should be unembedded", i);
            assert!(!out.diagnostics.embedded[i]);
            assert!(out.diagnostics.chosen[i].is_none());
        } else {
            assert!(p[0].is_finite() && p[1].is_finite(), "row {} should be embedded", i);
        }
    }
    assert_eq!(out.diagnostics.n_unembedded(), 2);
}

#[test]
fn test_row_sum_equal_to_threshold_is_excluded() {
    let training = random_training(100, 4, 3).into_shared();
    let params = MotionParams::default().with_activity_threshold(4.0);
    let out = find_embeddings(&[vec![1.0; 4], vec![2.0; 4]], training, &params).unwrap();
    assert!(out.z[0][0].is_nan());
    assert!(out.z[1][0].is_finite());
}

#[test]
fn test_training_points_reembed_near_their_coordinates() {
    init();
    let (training, raw, _) = clustered_training(25, 17);
    let coords = training.embedding().to_vec();
    let params = open_params().with_bandwidth(10.0, 60, 1e-5);

    let out = find_embeddings(&raw, training.into_shared(), &params).unwrap();

    let worst = out
        .z
        .iter()
        .zip(&coords)
        .map(|(z, c)| dist(*z, *c))
        .fold(0.0, f64::max);
    info!("Largest re-embedding error: {:.3}", worst);
    assert!(worst < 4.0);
}

#[test]
fn test_output_order_is_independent_of_batching() {
    init();
    let training = random_training(150, 6, 8).into_shared();
    let queries = random_rows(37, 6, 0.0, 1.0, 9);

    let a = BatchEmbedder::new(training.clone(), open_params().with_batching(5, 1))
        .unwrap()
        .embed(&queries)
        .unwrap();
    let b = BatchEmbedder::new(training.clone(), open_params().with_batching(100, 4))
        .unwrap()
        .embed(&queries)
        .unwrap();
    assert_eq!(a.z, b.z);

    // reversed input gives reversed output
    let reversed: Vec<Vec<f64>> = queries.iter().rev().cloned().collect();
    let c = BatchEmbedder::new(training, open_params()).unwrap().embed(&reversed).unwrap();
    let mut c_z = c.z.clone();
    c_z.reverse();
    assert_eq!(a.z, c_z);
}

#[test]
fn test_worker_failure_aborts_the_run() {
    init();
    let training = random_training(120, 6, 10).into_shared();
    let queries = random_rows(20, 6, 0.0, 1.0, 11);
    // one bisection step can never meet a 1e-12 tolerance
    let params = open_params()
        .with_bandwidth(20.0, 100, 1e-12)
        .with_max_sigma_iterations(1);

    match find_embeddings(&queries, training, &params) {
        Err(MotionError::TaskFailed { index, source }) => {
            assert!(index < 20);
            assert!(matches!(*source, MotionError::Convergence { .. }));
        }
        other => panic!("expected a task failure, got {:?}", other.map(|e| e.z.len())),
    }
}

#[test]
fn test_out_of_hull_policy() {
    init();
    let training = random_training(300, 8, 12).into_shared();
    let queries = random_rows(40, 8, 0.0, 1.0, 13);

    let guessed = find_embeddings(&queries, training.clone(), &open_params()).unwrap();
    let d = &guessed.diagnostics;
    for i in 0..queries.len() {
        if !d.in_hull[i] && !d.degenerate[i] {
            assert!(d.replaced_by_guess[i]);
            assert_eq!(guessed.z[i], d.guesses[i]);
        } else {
            assert!(!d.replaced_by_guess[i]);
        }
    }
    assert_eq!(d.n_replaced(), d.n_out_of_hull() - d.n_degenerate());

    let kept = find_embeddings(
        &queries,
        training,
        &open_params().with_out_of_hull(OutOfHullPolicy::KeepOptimized),
    )
    .unwrap();
    assert_eq!(kept.diagnostics.n_replaced(), 0);
    for i in 0..queries.len() {
        if d.in_hull[i] {
            assert_eq!(kept.z[i], guessed.z[i]);
        }
    }
}

#[test]
fn test_euclidean_features() {
    let training = random_training(150, 5, 14).into_shared();
    let queries = random_rows(10, 5, 0.0, 1.0, 15);
    let params = open_params().with_probability_features(false);
    let out = find_embeddings(&queries, training, &params).unwrap();
    assert_eq!(out.diagnostics.n_embedded(), 10);
}

#[test]
fn test_dimension_mismatch_and_empty_input() {
    let training = random_training(50, 4, 16).into_shared();
    let embedder = BatchEmbedder::new(training, open_params()).unwrap();
    assert!(matches!(
        embedder.embed(&[vec![1.0; 5]]),
        Err(MotionError::DimensionMismatch { expected: 4, got: 5 })
    ));
    let empty = embedder.embed(&[]).unwrap();
    assert!(empty.z.is_empty());
    assert!(empty.diagnostics.is_empty());
}

#[test]
fn test_invalid_params_are_rejected_up_front() {
    let training = random_training(50, 4, 17).into_shared();
    assert!(matches!(
        BatchEmbedder::new(training.clone(), MotionParams::default().with_batching(0, 1)),
        Err(MotionError::Configuration(_))
    ));
    // 50 training points can never reach perplexity 60
    assert!(matches!(
        BatchEmbedder::new(training.clone(), open_params().with_bandwidth(60.0, 200, 1e-5)),
        Err(MotionError::Configuration(_))
    ));
    assert!(matches!(
        BatchEmbedder::new(training, open_params().with_bandwidth(20.0, 10, 1e-5)),
        Err(MotionError::Configuration(_))
    ));
}

#[test]
fn test_progress_every_readout_points() {
    assert!(!reports_progress(0, 100));
    assert!(reports_progress(99, 100));
    assert!(!reports_progress(100, 100));
    assert!(reports_progress(199, 100));
    assert!(reports_progress(0, 1));
    assert!(reports_progress(5, 0));
}
