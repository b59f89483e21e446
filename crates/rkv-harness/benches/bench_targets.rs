// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — rkv-harness
//
// Per-input cost of both targets. The entry target pays for a fresh backend on
// every call; the request target reuses one.
// Run: cargo bench -p rkv-harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rkv_harness::seed::{entries_input, request_input};
use rkv_harness::targets::decode_request;
use rkv_harness::{EntryApplyTarget, HarnessConfig, InternalRequestApplyTarget};
use rkv_server::request::{ClusterVersionSetRequest, PutRequest};
use rkv_server::{InternalRequest, LogEntry, Request};

fn put(id: u64) -> InternalRequest {
    InternalRequest::new(
        id,
        Request::Put(PutRequest {
            key: format!("bench/{id}").into_bytes(),
            value: vec![0xab; 64],
            ..Default::default()
        }),
    )
}

// ─────────────────────────────────────────────────────────────────
// DECODE BENCHMARKS
// ─────────────────────────────────────────────────────────────────

fn bench_decode(c: &mut Criterion) {
    let data = request_input(&put(1), false);
    c.bench_function("decode/internal_request", |b| {
        b.iter(|| black_box(decode_request(black_box(&data))))
    });
}

// ─────────────────────────────────────────────────────────────────
// TARGET BENCHMARKS
// ─────────────────────────────────────────────────────────────────

fn bench_entry_target(c: &mut Criterion) {
    let target = EntryApplyTarget::new(HarnessConfig::default());
    let mut group = c.benchmark_group("entry_apply");
    group.sample_size(20);

    for n in [1u64, 8, 19] {
        let entries: Vec<LogEntry> = (1..=n)
            .filter_map(|i| put(i).encode().ok().map(|data| LogEntry::normal(1, i, data)))
            .collect();
        let data = entries_input(&entries);
        group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
            b.iter(|| black_box(target.run(data)))
        });
    }
    group.finish();
}

fn bench_request_target(c: &mut Criterion) {
    let target = InternalRequestApplyTarget::new(HarnessConfig::default());
    let put_data = request_input(&put(1), false);
    let version_data = request_input(
        &InternalRequest::new(
            2,
            Request::ClusterVersionSet(ClusterVersionSetRequest { ver: "3.7.0".into() }),
        ),
        true,
    );

    c.bench_function("request_apply/put", |b| {
        b.iter(|| black_box(target.run(&put_data)))
    });
    c.bench_function("request_apply/suppressed_downgrade", |b| {
        b.iter(|| black_box(target.run(&version_data)))
    });
}

criterion_group!(benches, bench_decode, bench_entry_target, bench_request_target);
criterion_main!(benches);
