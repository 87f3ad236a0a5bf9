use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use nestedset_core::{MemoryRecordStore, NestedSet, Node, NodeId, RecordStore};

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    implementation: &'static str,
    storage: &'static str,
    workload: String,
    timestamp: String,
    name: String,
    total_ops: u64,
    duration_ms: f64,
    ops_per_sec: f64,
    extra: Extra,
    source_file: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Extra {
    count: u64,
    fanout: u64,
    insert_ms: f64,
    rebuild_ms: f64,
}

fn main() {
    let mut count: u64 = 200;
    let mut fanout: u64 = 4;
    let mut out_file: Option<PathBuf> = None;
    for arg in env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--count=") {
            count = val.parse().unwrap_or(count);
        } else if let Some(val) = arg.strip_prefix("--fanout=") {
            fanout = val.parse().unwrap_or(fanout).max(1);
        } else if let Some(val) = arg.strip_prefix("--out=") {
            out_file = Some(PathBuf::from(val));
        }
    }

    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    store.insert(Node::root(NodeId(0))).expect("insert root");
    set.rebuild_tree(&mut store, NodeId(0), 1).expect("rebuild root");

    let start = Instant::now();
    for i in 1..=count {
        let parent = NodeId(u128::from((i - 1) / fanout));
        set.create(&mut store, Node::child(NodeId(u128::from(i)), parent))
            .expect("create");
    }
    let insert_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    set.rebuild_tree(&mut store, NodeId(0), 1).expect("rebuild");
    let rebuild_ms = start.elapsed().as_secs_f64() * 1000.0;
    let duration_ms = insert_ms + rebuild_ms;

    let output = Output {
        implementation: "core-memory",
        storage: "memory",
        workload: format!("insert-rebuild-{}", count),
        timestamp: chrono::Utc::now().to_rfc3339(),
        name: format!("insert-rebuild-{}-fanout-{}", count, fanout),
        total_ops: count + 1,
        duration_ms,
        ops_per_sec: if duration_ms > 0.0 {
            (count as f64 + 1.0) / duration_ms * 1000.0
        } else {
            f64::INFINITY
        },
        extra: Extra {
            count,
            fanout,
            insert_ms,
            rebuild_ms,
        },
        source_file: out_file.as_ref().map(|p| p.display().to_string()),
    };

    let json = serde_json::to_string_pretty(&output).expect("serialize");
    if let Some(path) = out_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdirs");
        }
        fs::write(&path, &json).expect("write output");
    }
    println!("{}", json);
}
