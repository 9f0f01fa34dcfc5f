//! Benchmarks for cedarkv tree operations

use criterion::{criterion_group, criterion_main, Criterion};

use cedarkv::Tree;

fn tree_benchmarks(c: &mut Criterion) {
    c.bench_function("insert_1k_sequential", |b| {
        b.iter(|| {
            let tree = Tree::new();
            for i in 0..1_000 {
                tree.insert(&format!("key{i:04}"), "value").unwrap();
            }
            tree
        })
    });

    let tree = Tree::new();
    for i in 0..1_000 {
        tree.insert(&format!("key{i:04}"), "value").unwrap();
    }

    c.bench_function("get_hit", |b| b.iter(|| tree.get("key0500")));

    c.bench_function("get_miss", |b| b.iter(|| tree.get("missing")));

    c.bench_function("insert_delete_cycle", |b| {
        b.iter(|| {
            tree.insert("transient", "v").unwrap();
            tree.remove("transient").unwrap();
        })
    });
}

criterion_group!(benches, tree_benchmarks);
criterion_main!(benches);
