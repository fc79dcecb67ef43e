use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use motionspace::bandwidth::BandwidthSolver;
use motionspace::divergence::list_kl_divergences;
use motionspace::{normalise_rows, BatchEmbedder, CandidateSelector, MotionParams, TrainingSet};
use rand::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2};
use std::hint::black_box;
use std::time::Duration;

const NFEATURES: usize = 25;

fn random_rows(n: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| (0..NFEATURES).map(|_| rng.random_range(1.0..50.0)).collect())
        .collect()
}

fn setup_training(n: usize, seed: u64) -> TrainingSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = normalise_rows(&random_rows(n, &mut rng)).unwrap();
    let coords = (0..n)
        .map(|_| [rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0)])
        .collect();
    TrainingSet::new(rows, coords).unwrap()
}

fn query_distances(training: &TrainingSet, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let query = normalise_rows(&random_rows(1, &mut rng)).unwrap();
    let d = list_kl_divergences(&query, training.data());
    let row: Vec<f64> = d.get_row(0).iterator(0).copied().collect();
    row
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let params = MotionParams::default()
        .with_activity_threshold(0.0)
        .with_bandwidth(32.0, 200, 1e-5);
    let training = setup_training(2_000, 42);
    let distances = query_distances(&training, 7);

    let mut group = c.benchmark_group("reembedding");
    group.warm_up_time(Duration::from_millis(300));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(40);

    group.bench_function(BenchmarkId::new("bandwidth_solve", "single"), |b| {
        let solver = BandwidthSolver::from_params(&params);
        b.iter(|| black_box(solver.solve(black_box(&distances)).unwrap()));
    });

    group.bench_function(BenchmarkId::new("placement", "single"), |b| {
        let selector = CandidateSelector::from_params(&training, &params);
        b.iter(|| black_box(selector.place(black_box(&distances)).unwrap()));
    });

    let shared = training.into_shared();
    for &batch in &[100usize, 500] {
        group.bench_function(BenchmarkId::new("batch_embed", batch), |b| {
            let embedder = BatchEmbedder::new(shared.clone(), params.clone()).unwrap();
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(batch as u64);
                    random_rows(batch, &mut rng)
                },
                |rows| black_box(embedder.embed(&rows).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
