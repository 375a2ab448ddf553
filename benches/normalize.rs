//! Normalization and ranking benchmark
//!
//! A large training run yields tens of thousands of call sites; normalizing
//! and ranking them must stay well below the profiled command's own runtime.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench normalize
//! ```

use cmdprof::config::ProfilerConfig;
use cmdprof::normalize::{NormalizeMode, Normalizer};
use cmdprof::report::{ReportView, SortCriterion};
use cmdprof::samples::RawSample;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const ORIGINS: [&str; 5] = [
    "/srv/app/train.py",
    "/venv/lib/python3.11/site-packages/ultralytics/engine/trainer.py",
    "/venv/lib/python3.11/site-packages/torch/nn/modules/conv.py",
    "/venv/lib/python3.11/site-packages/numpy/core/fromnumeric.py",
    "~",
];

const SYMBOLS: [&str; 5] = ["step", "forward", "_conv_forward", "sum", "<built-in method time.sleep>"];

/// Deterministic synthetic samples spread across all origin tiers
fn bench_samples(n: usize) -> Vec<RawSample> {
    (0..n)
        .map(|i| {
            let tt = (i % 97) as f64 * 1e-4;
            RawSample {
                origin: ORIGINS[i % ORIGINS.len()].to_string(),
                line: i as u32,
                symbol: SYMBOLS[(i / 3) % SYMBOLS.len()].to_string(),
                call_count: (i % 1000) as u64,
                primitive_calls: (i % 1000) as u64,
                self_time: tt,
                cumulative_time: tt * 3.0,
            }
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let config = ProfilerConfig::default();
    let mut group = c.benchmark_group("normalize");

    for size in [1_000, 10_000, 50_000] {
        let samples = bench_samples(size);
        for mode in [NormalizeMode::Detailed, NormalizeMode::Basic] {
            let normalizer = Normalizer::new(mode, &config);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), size),
                &samples,
                |b, samples| b.iter(|| normalizer.normalize(black_box(samples))),
            );
        }
    }
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let normalizer = Normalizer::new(NormalizeMode::Detailed, &ProfilerConfig::default());
    let timings = normalizer.normalize(&bench_samples(50_000));

    c.bench_function("rank_cumulative_top20", |b| {
        b.iter(|| ReportView::rank(black_box(&timings), SortCriterion::CumulativeTime, 20).len())
    });
}

criterion_group!(benches, bench_normalize, bench_rank);
criterion_main!(benches);
