// Ledger benchmarks.
//
// Covers the review path (submit, hold, release, complete) in memory and
// against a temporary sled store, plus audit chain verification at several
// log sizes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use guard_contracts::{Ledger, VerificationPolicy};
use guard_protocol::clock::SystemClock;
use guard_protocol::crypto::derive_tx_hash;
use guard_protocol::storage::LedgerDb;
use guard_protocol::Address;

fn review_path(ledger: &Ledger, counter: &AtomicU64) {
    let owner = Address::new("owner");
    let sender = Address::new("sender");
    let n = counter.fetch_add(1, Ordering::Relaxed);
    let h = derive_tx_hash(&n.to_string(), &sender, 100);

    ledger.submit_tx_hash(h, sender, 100).unwrap();
    ledger.hold_transaction(&owner, h, "manual review").unwrap();
    ledger
        .release_held_transaction(&owner, h, true, "cleared")
        .unwrap();
    ledger.complete_transaction(&owner, h).unwrap();
}

fn bench_review_path_in_memory(c: &mut Criterion) {
    let ledger = Ledger::new(Address::new("owner")).unwrap();
    let counter = AtomicU64::new(0);

    c.bench_function("ledger/review_path_in_memory", |b| {
        b.iter(|| review_path(&ledger, &counter));
    });
}

fn bench_review_path_sled(c: &mut Criterion) {
    let ledger = Ledger::open(
        LedgerDb::open_temporary().unwrap(),
        Address::new("owner"),
        VerificationPolicy::Permissive,
        Arc::new(SystemClock),
    )
    .unwrap();
    let counter = AtomicU64::new(0);

    let mut group = c.benchmark_group("ledger/review_path_sled");
    group.sample_size(20);
    group.bench_function("temporary", |b| {
        b.iter(|| review_path(&ledger, &counter));
    });
    group.finish();
}

fn bench_verify_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/verify_chain");

    for size in [100u64, 1_000, 10_000] {
        let ledger = Ledger::new(Address::new("owner")).unwrap();
        for i in 0..size {
            let h = derive_tx_hash(&i.to_string(), &Address::new("s"), 1);
            ledger.submit_tx_hash(h, Address::new("s"), 1).unwrap();
        }

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &ledger, |b, ledger| {
            b.iter(|| ledger.verify_chain().unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_review_path_in_memory,
    bench_review_path_sled,
    bench_verify_chain
);
criterion_main!(benches);
