use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use nestedset_core::{MemoryRecordStore, NestedSet, Node, NodeId};

const FANOUT: u128 = 4;

/// Complete `FANOUT`-ary tree of `count` nodes rooted at `NodeId(0)`, parents before children.
fn tree(count: u128) -> MemoryRecordStore {
    let nodes = (0..count).map(|i| {
        if i == 0 {
            Node::root(NodeId(0))
        } else {
            Node::child(NodeId(i), NodeId((i - 1) / FANOUT))
        }
    });
    MemoryRecordStore::with_nodes(nodes).unwrap()
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_tree");
    for count in [100u128, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let set = NestedSet::default();
            b.iter_batched(
                || tree(count),
                |mut store| set.rebuild_tree(&mut store, NodeId(0), 1).unwrap(),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_leaf_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_leaf");
    for count in [100u128, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let set = NestedSet::default();
            b.iter_batched(
                || {
                    let mut store = tree(count);
                    set.rebuild_tree(&mut store, NodeId(0), 1).unwrap();
                    store
                },
                |mut store| {
                    // Lands early in the partition, so nearly every boundary shifts.
                    set.create(&mut store, Node::child(NodeId(count), NodeId(1)))
                        .unwrap()
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rebuild, bench_leaf_insert);
criterion_main!(benches);
