//! Seeded data generators shared by the test modules.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::{normalise_rows, Point2, TrainingSet};

/// Cluster centres used by the clustered fixtures.
pub const CENTRES_2D: [Point2; 4] = [[-20.0, -20.0], [20.0, -20.0], [-20.0, 20.0], [20.0, 20.0]];

/// `n` rows of `d` uniform amplitudes in `[lo, hi)`.
pub fn random_rows(n: usize, d: usize, lo: f64, hi: f64, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..d).map(|_| rng.random_range(lo..hi)).collect())
        .collect()
}

pub fn random_coords(n: usize, scale: f64, seed: u64) -> Vec<Point2> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.random_range(-scale..scale), rng.random_range(-scale..scale)])
        .collect()
}

/// Normalised random rows paired with random coordinates.
pub fn random_training(n: usize, d: usize, seed: u64) -> TrainingSet {
    let rows = normalise_rows(&random_rows(n, d, 0.0, 1.0, seed)).unwrap();
    TrainingSet::new(rows, random_coords(n, 50.0, seed + 1)).unwrap()
}

/// Four well-separated groups in 8 features. Group `c` carries most of its
/// mass on features `2c` and `2c + 1`; its coordinates jitter around
/// `CENTRES_2D[c]`. Returns raw rows, coordinates and group of every row.
pub fn clustered_rows(per_group: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<Point2>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut coords = Vec::new();
    let mut groups = Vec::new();
    for (c, centre) in CENTRES_2D.iter().enumerate() {
        for _ in 0..per_group {
            let row: Vec<f64> = (0..8)
                .map(|k| {
                    let base = if k / 2 == c { 20.0 } else { 1.0 };
                    base + rng.random_range(0.0..0.5)
                })
                .collect();
            rows.push(row);
            coords.push([
                centre[0] + rng.random_range(-1.0..1.0),
                centre[1] + rng.random_range(-1.0..1.0),
            ]);
            groups.push(c);
        }
    }
    (rows, coords, groups)
}

pub fn clustered_training(per_group: usize, seed: u64) -> (TrainingSet, Vec<Vec<f64>>, Vec<usize>) {
    let (raw, coords, groups) = clustered_rows(per_group, seed);
    let training = TrainingSet::new(normalise_rows(&raw).unwrap(), coords).unwrap();
    (training, raw, groups)
}

pub fn dist(a: Point2, b: Point2) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}
