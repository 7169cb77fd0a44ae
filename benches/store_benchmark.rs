use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use devtel::{EventTracker, HookEvent, LogStore, MemorySink, StoreConfig};
use devtel_core_store::Record;
use std::hint::black_box;
use tempfile::TempDir;

/// Fill a log directory with `pairs` before/after pairs
fn populate(dir: &TempDir, pairs: usize) {
    let mut store = LogStore::new(StoreConfig::new(dir.path()));
    store.init().unwrap();
    for i in 0..pairs {
        let id = format!("run-{}", i);
        store
            .append(&HookEvent::new("before:deploy", 1_000).with_execution_id(&id))
            .unwrap();
        store
            .append(&HookEvent::new("after:deploy", 2_000).with_execution_id(&id))
            .unwrap();
    }
}

/// Append cost, including the open/close of the log file per record
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    let temp = TempDir::new().unwrap();
    let mut store = LogStore::new(StoreConfig::new(temp.path()));
    store.init().unwrap();
    store.add_default_field("os.name", std::env::consts::OS);
    store.add_default_field("os.arch", std::env::consts::ARCH);

    let mut seq = 0i64;
    group.bench_function("hook_event", |b| {
        b.iter(|| {
            seq += 1;
            let event = HookEvent::new("before:build", seq).with_execution_id(seq.to_string());
            store.append(black_box(&event)).unwrap();
        });
    });

    group.finish();
}

/// Replay cost of `init` for growing logs
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for pairs in [100usize, 1_000, 10_000].iter() {
        let temp = TempDir::new().unwrap();
        populate(&temp, *pairs);

        group.throughput(Throughput::Elements((*pairs * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pairs), pairs, |b, _| {
            b.iter(|| {
                let mut store = LogStore::new(StoreConfig::new(temp.path()));
                store.init().unwrap();
                black_box(store.len());
            });
        });
    }

    group.finish();
}

/// Pairing lookup plus append through the tracker
fn bench_track_pair(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    populate(&temp, 1_000);

    let mut store = LogStore::new(StoreConfig::new(temp.path()));
    store.init().unwrap();
    let mut tracker = EventTracker::new(store, MemorySink::new());

    let mut i = 0usize;
    c.bench_function("track_closing_hook", |b| {
        b.iter(|| {
            let event =
                HookEvent::new("after:deploy", 3_000).with_execution_id(format!("run-{}", i % 1_000));
            i += 1;
            let outcome = tracker.track(event).unwrap();
            black_box(outcome.duration_ms);
        });
    });

    black_box(tracker.store().all().next().map(|r| r.key()));
}

criterion_group!(benches, bench_append, bench_replay, bench_track_pair);
criterion_main!(benches);
