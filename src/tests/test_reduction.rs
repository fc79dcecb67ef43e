use approx::assert_relative_eq;
use smartcore::linalg::basic::{
    arrays::{Array, Array2},
    matrix::DenseMatrix,
};

use crate::config::{MotionParams, ReferenceMethod};
use crate::error::MotionError;
use crate::reduction::{project_matrix, FitTransform, ImplicitProjection, ProjectionFit};
use crate::tests::test_helpers::random_rows;
use crate::training::ReferenceFit;

// ============================================================================
// ImplicitProjection Tests
// ============================================================================

#[test]
fn test_seeded_projection_is_reproducible() {
    let a = ImplicitProjection::with_seed(30, 2, 17);
    let b = ImplicitProjection::with_seed(30, 2, 17);
    let query = vec![1.0; 30];

    assert_eq!(a.project(&query), b.project(&query));
    assert_ne!(
        a.project(&query),
        ImplicitProjection::with_seed(30, 2, 18).project(&query)
    );
}

#[test]
fn test_projection_is_linear() {
    let proj = ImplicitProjection::with_seed(25, 2, 3);
    let query: Vec<f64> = (0..25).map(|i| i as f64 * 0.1).collect();
    let doubled: Vec<f64> = query.iter().map(|x| x * 2.0).collect();

    let p1 = proj.project(&query);
    let p2 = proj.project(&doubled);
    for (a, b) in p1.iter().zip(&p2) {
        assert_relative_eq!(2.0 * a, *b, epsilon = 1e-9);
    }
    assert!(proj.project(&vec![0.0; 25]).iter().all(|x| x.abs() < 1e-12));
}

// ============================================================================
// project_matrix Tests
// ============================================================================

#[test]
fn test_project_matrix_matches_rows() {
    let rows = random_rows(6, 4, 0.0, 1.0, 2);
    let matrix = DenseMatrix::from_iterator(rows.iter().flatten().copied(), 6, 4, 0);
    let proj = ImplicitProjection::with_seed(4, 2, 9);

    let projected = project_matrix(&matrix, &proj);
    assert_eq!(projected.shape(), (6, 2));
    for (i, row) in rows.iter().enumerate() {
        let expected = proj.project(row);
        assert_relative_eq!(*projected.get((i, 0)), expected[0], epsilon = 1e-12);
        assert_relative_eq!(*projected.get((i, 1)), expected[1], epsilon = 1e-12);
    }
}

// ============================================================================
// FitTransform Tests
// ============================================================================

#[test]
fn test_fit_transform_centres_and_scales() {
    let raw = [[1.0, 2.0], [3.0, -4.0], [5.0, 2.0]];
    let t = FitTransform::fit(&raw, 100.0).unwrap();

    assert_relative_eq!(t.mean[0], 3.0, epsilon = 1e-12);
    assert_relative_eq!(t.mean[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(t.scale, 20.0, epsilon = 1e-12);

    let p = t.apply([5.0, 2.0]);
    assert_relative_eq!(p[0], 40.0, epsilon = 1e-9);
    assert_relative_eq!(p[1], 40.0, epsilon = 1e-9);
}

#[test]
fn test_fit_transform_serde() {
    let t = FitTransform::fit(&[[0.5, -1.5], [2.0, 1.0]], 10.0).unwrap();
    let json = serde_json::to_string(&t).unwrap();
    let back: FitTransform = serde_json::from_str(&json).unwrap();
    assert_eq!(t, back);
}

#[test]
fn test_fit_transform_rejects_degenerate() {
    assert!(matches!(FitTransform::fit(&[], 100.0), Err(MotionError::EmptyInput(_))));
    assert!(matches!(
        FitTransform::fit(&[[0.0, 0.0], [0.0, 0.0]], 100.0),
        Err(MotionError::ReferenceFit(_))
    ));
}

// ============================================================================
// ProjectionFit Tests
// ============================================================================

#[test]
fn test_projection_fit_output() {
    let rows = random_rows(40, 5, 0.0, 1.0, 4);
    let params = MotionParams::default();
    let fit = ProjectionFit::new(8);

    let (y, transform) = fit.fit_with_transform(&rows, &params).unwrap();
    assert_eq!(y.len(), 40);
    assert!(y.iter().all(|p| p[0].is_finite() && p[1].is_finite()));

    // same seed, same embedding
    assert_eq!(ReferenceFit::fit(&ProjectionFit::new(8), &rows, &params).unwrap(), y);

    // embedding is the transformed raw projection
    let proj = ImplicitProjection::with_seed(5, 2, fit.seed());
    let raw0 = proj.project(&rows[0]);
    let expected = transform.apply([raw0[0], raw0[1]]);
    assert_relative_eq!(y[0][0], expected[0], epsilon = 1e-9);
    assert_relative_eq!(y[0][1], expected[1], epsilon = 1e-9);
}

#[test]
fn test_projection_fit_method() {
    assert_eq!(ProjectionFit::new(1).method(), ReferenceMethod::Tsne);
    assert_eq!(
        ProjectionFit::new(1).with_method(ReferenceMethod::Umap).method(),
        ReferenceMethod::Umap
    );
}

#[test]
fn test_projection_fit_rejects_ragged_rows() {
    let rows = vec![vec![1.0, 2.0], vec![1.0]];
    assert!(ProjectionFit::new(1).fit(&rows, &MotionParams::default()).is_err());
}
