//! Benchmarks for directory job bookkeeping.
//!
//! Run with: cargo bench -p vlmcap-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vlmcap_core::{clean_caption, DirectoryJob, FileState};

fn file_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("IMG_{i:05}.jpg")).collect()
}

fn benchmark_job_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_updates");

    for size in [100, 1_000, 10_000] {
        let files = file_names(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &files, |b, files| {
            b.iter(|| {
                let job = DirectoryJob::new(files.clone());
                for file in files {
                    let _ = job.update(file, FileState::Processing, "");
                    let _ = job.update(file, FileState::Success, "a cat on a windowsill");
                }
                black_box(job.is_complete())
            })
        });
    }

    group.finish();
}

fn benchmark_progress_snapshot(c: &mut Criterion) {
    let files = file_names(1_000);
    let job = DirectoryJob::new(files.clone());
    for file in files.iter().take(500) {
        let _ = job.update(file, FileState::Processing, "");
        let _ = job.update(file, FileState::Success, "a cat on a windowsill");
    }

    c.bench_function("progress_1000_files", |b| {
        b.iter(|| black_box(job.progress()))
    });
}

fn benchmark_clean_caption(c: &mut Criterion) {
    let with_marker = "A tabby cat sleeping on a sunny windowsill next to a potted fern (high confidence)";
    let without_marker = "A tabby cat sleeping on a sunny windowsill next to a potted fern";

    c.bench_function("clean_caption_marker", |b| {
        b.iter(|| clean_caption(black_box(with_marker)))
    });
    c.bench_function("clean_caption_plain", |b| {
        b.iter(|| clean_caption(black_box(without_marker)))
    });
}

criterion_group!(
    benches,
    benchmark_job_updates,
    benchmark_progress_snapshot,
    benchmark_clean_caption
);
criterion_main!(benches);
