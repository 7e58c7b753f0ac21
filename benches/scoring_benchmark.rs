//! Benchmark of single-record scoring with and without explanations, and of
//! batch probability prediction.
//!
//! Run with: cargo bench --bench scoring_benchmark

#[path = "../tests/common/mod.rs"]
mod common;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use oncorisk::model::Classifier;
use oncorisk::serving::{InferenceService, PermutationExplainer};

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    let payload = common::high_risk_payload();

    let explained = InferenceService::from_bundle(common::fitted_bundle(true));
    group.bench_function("with_explanation", |b| {
        b.iter(|| explained.score(black_box(&payload)).unwrap())
    });

    let plain = InferenceService::from_bundle(common::fitted_bundle(false));
    group.bench_function("probability_only", |b| {
        b.iter(|| plain.score(black_box(&payload)).unwrap())
    });

    group.finish();
}

fn bench_explainer_permutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("explainer_permutations");
    let bundle = common::fitted_bundle(true);
    let background = bundle.background.clone().unwrap_or_default();
    let row = background[0].clone();

    for permutations in [2usize, 8, 32] {
        let explainer = PermutationExplainer::new(&bundle.model, &background, permutations, 42);
        group.bench_with_input(BenchmarkId::from_parameter(permutations), &row, |b, row| {
            b.iter(|| explainer.shap_values(black_box(row)))
        });
    }
    group.finish();
}

fn bench_predict_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_batch");
    let bundle = common::fitted_bundle(false);

    for rows in [100usize, 1_000, 10_000] {
        let df = common::hematology_dataframe(rows);
        let matrix = bundle.preprocessing.apply(&df).unwrap();

        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &matrix.rows, |b, rows| {
            b.iter(|| bundle.model.predict_batch(black_box(rows)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_score, bench_explainer_permutations, bench_predict_batch);
criterion_main!(benches);
