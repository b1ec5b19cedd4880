//! Record store benchmarks
//!
//! Measures:
//! - Node record reads and writes through the page cache
//! - String chain writes and reads at several payload sizes
//! - Highest transaction id offers, single and contended

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use recstore_core::StoreConfig;
use recstore_core::storage::format::{DynamicFormat, DynamicKind, NodeFormat};
use recstore_core::storage::{DynamicStore, HighestTransactionId, NodeRecord, NodeStore, RecordStore};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn benchmark_node_records(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = NodeStore::open(dir.path().join("nodes.store"), NodeFormat, &StoreConfig::default())
        .unwrap();
    for _ in 0..10_000 {
        let id = store.next_id().unwrap();
        store.update_record(&NodeRecord::created(id)).unwrap();
    }

    let mut group = c.benchmark_group("node_records");

    group.bench_function("get_record", |b| {
        let mut id = 0;
        b.iter(|| {
            id = (id + 7919) % 10_000;
            black_box(store.get_record(id).unwrap());
        })
    });

    group.bench_function("update_record", |b| {
        let mut id = 0;
        b.iter(|| {
            id = (id + 7919) % 10_000;
            let mut record = NodeRecord::created(id);
            record.next_prop = id;
            store.update_record(black_box(&record)).unwrap();
        })
    });

    group.finish();
}

fn benchmark_string_chains(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let format = DynamicFormat::new(DynamicKind::String, "StringPropertyStore", 128).unwrap();
    let store =
        DynamicStore::open_dynamic(dir.path().join("strings.store"), format, &StoreConfig::default())
            .unwrap();

    let mut group = c.benchmark_group("string_chains");
    for size in [16usize, 512, 4096] {
        let value = "x".repeat(size);
        let head = store.write_string(&value).unwrap();

        group.bench_with_input(BenchmarkId::new("read", size), &head, |b, &head| {
            b.iter(|| black_box(store.read_string(head).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("rewrite", size), &value, |b, value| {
            b.iter(|| store.rewrite_chain(head, value.as_bytes()).unwrap())
        });
    }
    group.finish();
}

fn benchmark_tx_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("highest_tx_id");

    group.bench_function("offer_uncontended", |b| {
        let tracker = HighestTransactionId::default();
        let mut tx = 1;
        b.iter(|| {
            tx += 1;
            black_box(tracker.offer(tx, 0, tx))
        })
    });

    group.bench_function("offer_4_threads", |b| {
        b.iter(|| {
            let tracker = Arc::new(HighestTransactionId::default());
            let handles: Vec<_> = (0..4u64)
                .map(|t| {
                    let tracker = tracker.clone();
                    thread::spawn(move || {
                        for tx in (t..4_000).step_by(4) {
                            tracker.offer(tx, 0, tx);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            black_box(tracker.get())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_node_records,
    benchmark_string_chains,
    benchmark_tx_tracker
);
criterion_main!(benches);
