//! Detector throughput benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trueno_isc::codec::RowCodec;
use trueno_isc::detector::{
    AnomalyDetector, CombinationRule, ComponentSpec, DetailRequest, DetectorConfig,
};
use trueno_isc::format::{ColumnType, Format};
use trueno_isc::Row;

const SMALL_SIZE: usize = 1_000; // 1K rows
const MEDIUM_SIZE: usize = 10_000; // 10K rows

fn format() -> Format {
    Format::new()
        .with_column("class", ColumnType::Discrete)
        .with_column("events", ColumnType::Discrete)
        .with_column("hours", ColumnType::Discrete)
        .with_column("x", ColumnType::Continuous)
        .with_column("y", ColumnType::Continuous)
        .with_column("z", ColumnType::Continuous)
}

fn detector(config: DetectorConfig) -> AnomalyDetector {
    let specs = vec![
        ComponentSpec::poisson(1, 2).unwrap(),
        ComponentSpec::gaussian(vec![3, 4, 5]).unwrap(),
    ];
    AnomalyDetector::new(&format(), &specs, config).unwrap()
}

fn rows(n: usize, seed: u64) -> Vec<Row> {
    let format = format();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let class = f64::from(rng.gen_range(0u8..4));
            let hours = f64::from(rng.gen_range(1u8..6));
            let events = (hours * 3.0 + rng.gen_range(-2.0..2.0)).max(0.0).round();
            let x: f64 = rng.gen_range(-1.0..1.0);
            let values = [class, events, hours, x, 2.0 * x + rng.gen_range(-0.1..0.1), rng.gen()];
            RowCodec::encode(&format, &values).unwrap()
        })
        .collect()
}

/// Benchmark online training
fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("train");

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let data = rows(size, 7);
        group.bench_with_input(BenchmarkId::new("plain", size), &data, |b, data| {
            b.iter(|| {
                let mut d = detector(DetectorConfig::default());
                d.train_batch(black_box(data)).unwrap();
                d
            });
        });
    }

    let data = rows(SMALL_SIZE, 7);
    let clustered = DetectorConfig::builder()
        .offset(1)
        .split_attribute(0)
        .clustering(true)
        .threshold(6.0)
        .build()
        .unwrap();
    group.bench_with_input(
        BenchmarkId::new("split_clustered", SMALL_SIZE),
        &data,
        |b, data| {
            b.iter(|| {
                let mut d = detector(clustered.clone());
                d.train_batch(black_box(data)).unwrap();
                d
            });
        },
    );

    group.finish();
}

/// Benchmark batch scoring against a trained model
fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");

    let mut trained = detector(
        DetectorConfig::builder()
            .combination_rule(CombinationRule::Plus)
            .build()
            .unwrap(),
    );
    trained.train_batch(&rows(MEDIUM_SIZE, 7)).unwrap();

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let probes = rows(size, 11);
        let mut out = vec![0.0; size];
        group.bench_with_input(BenchmarkId::new("score_batch_into", size), &probes, |b, probes| {
            b.iter(|| trained.score_batch_into(black_box(probes), &mut out).unwrap());
        });
    }

    let probes = rows(SMALL_SIZE, 13);
    group.bench_with_input(
        BenchmarkId::new("score_details_all", SMALL_SIZE),
        &probes,
        |b, probes| {
            b.iter(|| {
                for probe in black_box(probes) {
                    black_box(trained.score_details(probe, DetailRequest::all()).unwrap());
                }
            });
        },
    );

    group.finish();
}

/// Benchmark export/import of a trained model
fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence");

    let mut trained = detector(DetectorConfig::default());
    trained.train_batch(&rows(SMALL_SIZE, 7)).unwrap();
    let json = trained.export_json().unwrap();

    group.bench_function("export_json", |b| {
        b.iter(|| black_box(&trained).export_json().unwrap());
    });
    group.bench_function("import_json", |b| {
        b.iter(|| {
            let mut d = detector(DetectorConfig::default());
            d.import_json(black_box(&json)).unwrap();
            d
        });
    });

    group.finish();
}

criterion_group!(benches, bench_train, bench_score, bench_persistence);
criterion_main!(benches);
