use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use eth_tx_tracker::database::SqliteStore;
use eth_tx_tracker::models::{format_wei_as_ether, parse_quantity, Transaction};
use eth_tx_tracker::storage::{MemoryStore, StateStore};

const SUBSCRIBER: &str = "0xf977814e90da44bfa03b6295a0616a897441acec";

fn create_test_transaction(id: u64) -> Transaction {
    Transaction {
        subscriber: SUBSCRIBER.to_string(),
        hash: format!("0x{:064x}", id),
        block_number: format!("0x{:x}", 1000 + id),
        from: format!("0x{:040x}", id),
        to: Some(SUBSCRIBER.to_string()),
        value: format!("0x{:x}", (id + 1) * 1_000_000_000),
        ..Default::default()
    }
}

fn bench_add_transaction(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("bench.db");

    let stores: Vec<(&str, Box<dyn StateStore>)> = vec![
        ("memory", Box::new(MemoryStore::new())),
        (
            "sqlite",
            Box::new(SqliteStore::new(db_path.to_str().unwrap()).expect("Failed to create database")),
        ),
    ];

    let mut group = c.benchmark_group("add_transaction");

    for (name, store) in &stores {
        store.subscribe(SUBSCRIBER);
        for size in [1u64, 10, 100].iter() {
            group.bench_with_input(BenchmarkId::new(*name, size), size, |b, &size| {
                b.iter(|| {
                    for i in 0..size {
                        store.add_transaction(SUBSCRIBER, black_box(create_test_transaction(i)));
                    }
                });
            });
        }
    }

    group.finish();
}

fn bench_get_transactions(c: &mut Criterion) {
    let sqlite = SqliteStore::new_in_memory().expect("Failed to create database");
    let memory = MemoryStore::new();

    for store in [&sqlite as &dyn StateStore, &memory] {
        store.subscribe(SUBSCRIBER);
        for i in 0..1000 {
            store.add_transaction(SUBSCRIBER, create_test_transaction(i));
        }
    }

    let mut group = c.benchmark_group("get_transactions");

    group.bench_function("memory", |b| {
        b.iter(|| memory.get_transactions(black_box(SUBSCRIBER)));
    });

    group.bench_function("sqlite", |b| {
        b.iter(|| sqlite.get_transactions(black_box(SUBSCRIBER)));
    });

    group.bench_function("is_subscribed_sqlite", |b| {
        b.iter(|| sqlite.is_subscribed(black_box("0x0000000000000000000000000000000000000000")));
    });

    group.finish();
}

fn bench_amount_formatting(c: &mut Criterion) {
    c.bench_function("format_wei_as_ether", |b| {
        b.iter(|| {
            let wei = parse_quantity(black_box("0x56bc75e2d63100000")).unwrap();
            format_wei_as_ether(wei)
        });
    });
}

criterion_group!(benches, bench_add_transaction, bench_get_transactions, bench_amount_formatting);
criterion_main!(benches);
