//! Benchmarks for keyed reconciliation and batched signal writes
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::{h, Engine, Host, Node, Props, Scope};

fn list(cx: &Scope, keys: &[usize]) -> Node {
    let items: Vec<Node> = keys
        .iter()
        .map(|key| h(cx, "li", Props::new().key(*key), *key))
        .collect();
    h(cx, "ul", Props::new(), items)
}

// =============================================================================
// RECONCILIATION BENCHMARKS
// =============================================================================

fn bench_keyed_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_reverse");
    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let engine = Engine::new();
            let root = engine.host().create_element("main");
            let cx = engine.scope();
            let forward: Vec<usize> = (0..size).collect();
            let backward: Vec<usize> = forward.iter().rev().copied().collect();
            let id = engine.render(list(&cx, &forward), root);
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let keys = if flip { &backward } else { &forward };
                engine.update(id, black_box(list(&cx, keys))).ok();
            })
        });
    }
    group.finish();
}

fn bench_keyed_rotate(c: &mut Criterion) {
    let engine = Engine::new();
    let root = engine.host().create_element("main");
    let cx = engine.scope();
    let mut keys: Vec<usize> = (0..500).collect();
    let id = engine.render(list(&cx, &keys), root);

    c.bench_function("keyed_rotate_500", |b| {
        b.iter(|| {
            keys.rotate_left(1);
            engine.update(id, black_box(list(&cx, &keys))).ok();
        })
    });
}

fn bench_unkeyed_append(c: &mut Criterion) {
    c.bench_function("unkeyed_append_100", |b| {
        let engine = Engine::new();
        let root = engine.host().create_element("main");
        let cx = engine.scope();
        b.iter(|| {
            let id = engine.render(h(&cx, "ul", Props::new(), ()), root);
            for size in 1..=100usize {
                let items: Vec<Node> = (0..size).map(|i| h(&cx, "li", Props::new(), i)).collect();
                engine.update(id, h(&cx, "ul", Props::new(), items)).ok();
            }
            engine.unmount(id).ok();
        })
    });
}

// =============================================================================
// SCHEDULER BENCHMARKS
// =============================================================================

fn bench_batched_writes(c: &mut Criterion) {
    let engine = Engine::new();
    let signals: Vec<_> = (0..64).map(|i| engine.signal(i)).collect();
    let sources = signals.clone();
    let total = engine.derive(move || sources.iter().map(|s| s.get()).sum::<i64>());

    c.bench_function("batched_writes_64", |b| {
        b.iter(|| {
            for signal in &signals {
                signal.update(|v| v + 1);
            }
            engine.flush();
            black_box(total.get_untracked())
        })
    });
}

criterion_group!(
    benches,
    bench_keyed_reverse,
    bench_keyed_rotate,
    bench_unkeyed_append,
    bench_batched_writes,
);
criterion_main!(benches);
