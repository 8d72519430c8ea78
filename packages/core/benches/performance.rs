//! Performance benchmarks for tree mutations
//!
//! Run with: `cargo bench -p nestedset-core`
//!
//! These benchmarks measure the critical paths:
//! - Appending children (one `sync` shift per insert)
//! - Reparenting a subtree across the tree (park, shift, fold)
//! - Sibling reordering and full-scope verification

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nestedset_core::db::MemoryTreeStore;
use nestedset_core::{MoveCount, NestedSet, NewNode, TreeConfig};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Build a tree of `roots` top-level nodes with `fanout` children each
async fn build_tree(roots: usize, fanout: usize) -> NestedSet {
    let tree = NestedSet::new(Arc::new(MemoryTreeStore::new()), TreeConfig::default())
        .expect("default config is valid");
    let writer = tree.writer().await;
    for r in 0..roots {
        let root = writer
            .create(NewNode::root(json!({ "name": format!("root {}", r) })).with_id(format!("r{}", r)))
            .await
            .unwrap();
        for c in 0..fanout {
            writer
                .create(
                    NewNode::child_of(&root.id, json!({ "name": format!("child {}", c) }))
                        .with_id(format!("r{}c{}", r, c)),
                )
                .await
                .unwrap();
        }
    }
    drop(writer);
    tree
}

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("create_child_in_200_node_tree", |b| {
        b.iter_batched(
            || rt.block_on(build_tree(10, 20)),
            |tree| {
                rt.block_on(async {
                    let writer = tree.writer().await;
                    writer
                        .create(NewNode::child_of("r0", json!({ "name": "new" })))
                        .await
                        .unwrap();
                })
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_set_parent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("set_parent_subtree_first_to_last_root", |b| {
        b.iter_batched(
            || rt.block_on(build_tree(10, 20)),
            |tree| {
                rt.block_on(async {
                    let writer = tree.writer().await;
                    black_box(writer.set_parent("r0", Some("r9")).await.unwrap());
                })
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_move_and_verify(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tree = rt.block_on(build_tree(10, 20));

    c.bench_function("move_down_then_up", |b| {
        b.iter(|| {
            rt.block_on(async {
                let writer = tree.writer().await;
                writer.move_down("r0c0", MoveCount::default()).await.unwrap();
                writer.move_up("r0c0", MoveCount::default()).await.unwrap();
            })
        })
    });

    c.bench_function("verify_210_nodes", |b| {
        b.iter(|| rt.block_on(async { black_box(tree.verify().await.unwrap()) }))
    });
}

criterion_group!(benches, bench_insert, bench_set_parent, bench_move_and_verify);
criterion_main!(benches);
