//! Shared fixtures: temp stores, behaviors, edges, seeds

use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use engram_core::{Behavior, EdgeKind, GraphEdge, GraphStore, Seed, SqliteStore, WhenPredicate};

/// Fresh store in a temp dir; keep the dir alive for the test's lifetime
pub fn temp_store() -> (Arc<SqliteStore>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let store =
        Arc::new(SqliteStore::new(Some(dir.path().join("e2e.db"))).expect("open store"));
    (store, dir)
}

/// Minimal behavior keyed by a short tag; the id is derived from the tag so
/// fixtures are stable across runs
pub fn behavior(tag: &str) -> Behavior {
    Behavior::new(
        Behavior::id_for(tag, tag),
        &format!("learned/{}", tag),
        format!("rule about {}", tag),
    )
}

/// Behavior with a predicate
pub fn scoped_behavior(tag: &str, when: WhenPredicate) -> Behavior {
    let mut b = behavior(tag);
    b.when = when;
    b
}

/// Insert a behavior, panicking on failure
pub fn add(store: &SqliteStore, b: &Behavior) {
    let cancel = CancellationToken::new();
    store.add_behavior(&cancel, b).expect("add behavior");
}

/// Insert an edge, panicking on failure
pub fn link(store: &SqliteStore, source: &str, target: &str, kind: EdgeKind, weight: f64) {
    let cancel = CancellationToken::new();
    store
        .add_edge(&cancel, &GraphEdge::new(source, target, kind, weight))
        .expect("add edge");
}

/// A seed with a fixed source label
pub fn seed(id: &str, activation: f64) -> Seed {
    Seed {
        id: id.to_string(),
        activation,
        source: "context:e2e".to_string(),
    }
}

/// Sample variance of a slice
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}
