//! Graph store - durable, transactional storage of the behavior graph
//!
//! The store is the only shared mutable resource in the system. Readers run
//! concurrently; writers serialize through a store-level transaction that
//! either commits atomically or leaves the store unchanged. Every operation
//! takes a cancellation token and checks it before touching the database.
//!
//! `GraphStore` is a capability contract: components hold `Arc<dyn
//! GraphStore>` and resolve node/edge identifiers through it, which keeps
//! the cyclic behavior graph free of ownership cycles. `SqliteStore` is the
//! production implementation.

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::model::{Behavior, BehaviorKind, Correction, EdgeKind, GraphEdge, WhenPredicate};

// ============================================================================
// ERRORS
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed input rejected at the boundary
    #[error("Validation error: {0}")]
    Validation(String),
    /// Constraint violation (self-loop, duplicate triple)
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Operation cancelled by the caller's token
    #[error("Operation cancelled")]
    Cancelled,
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Direction of edge traversal relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose target is the node
    Inbound,
    /// Edges whose source is the node
    Outbound,
    /// Both of the above
    Both,
}

/// Filter for behavior queries.
///
/// All clauses are conjunctive. The `when_overlaps` clause is a best-effort
/// prefilter: it keeps any behavior whose predicate shares a key with the
/// given one, or where either side is unscoped; final matching belongs to
/// the seed selector.
#[derive(Debug, Clone, Default)]
pub struct BehaviorFilter {
    /// Restrict to one kind
    pub kind: Option<BehaviorKind>,
    /// Require this tag to be present
    pub tag: Option<String>,
    /// Keep behaviors whose `when` could overlap this predicate
    pub when_overlaps: Option<WhenPredicate>,
    /// Include behaviors in terminal curation states
    pub include_curated: bool,
}

impl BehaviorFilter {
    /// Filter matching all active (non-curated) behaviors
    pub fn active() -> Self {
        Self::default()
    }

    /// Restrict to a kind
    pub fn with_kind(mut self, kind: BehaviorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Require a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Keep only behaviors whose predicate could overlap `when`
    pub fn overlapping(mut self, when: WhenPredicate) -> Self {
        self.when_overlaps = Some(when);
        self
    }
}

/// One entry of a batched edge-weight update
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWeightUpdate {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Edge kind
    pub kind: EdgeKind,
    /// New stored weight; clamped on write
    pub weight: f64,
}

/// A co-activation pair that has no edge yet. The store counts occurrences
/// and creates the edge at `initial_weight` once the gate is met.
#[derive(Debug, Clone, PartialEq)]
pub struct CoActivationCandidate {
    /// Smaller endpoint id (canonical order)
    pub source: String,
    /// Larger endpoint id (canonical order)
    pub target: String,
    /// Weight the edge starts at when the gate opens
    pub initial_weight: f64,
}

/// Outcome of one transactional Hebbian batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HebbianReport {
    /// Existing edges whose weight was updated
    pub updated: usize,
    /// Pairs whose edge was created this batch
    pub created: Vec<(String, String)>,
    /// Pairs whose counter advanced without reaching the gate
    pub pending: usize,
}

/// Full graph dump used by backup and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDump {
    /// Payload format version
    pub version: u32,
    /// When the dump was taken
    pub created_at: DateTime<Utc>,
    /// Every behavior node
    pub nodes: Vec<Behavior>,
    /// Every edge
    pub edges: Vec<GraphEdge>,
}

// ============================================================================
// GRAPH STORE CONTRACT
// ============================================================================

/// Capability contract of the graph store.
///
/// Every method checks the cancellation token before doing work; a
/// cancelled token aborts any in-flight transaction (committing nothing)
/// and surfaces [`StoreError::Cancelled`].
pub trait GraphStore: Send + Sync {
    /// Insert a behavior node. Rejects invalid nodes and duplicate ids.
    fn add_behavior(&self, cancel: &CancellationToken, behavior: &Behavior) -> Result<()>;

    /// Fetch a behavior by id; absence is `Ok(None)`, not an error.
    fn get_behavior(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Behavior>>;

    /// Overwrite an existing behavior. Unknown ids are a conflict.
    fn update_behavior(&self, cancel: &CancellationToken, behavior: &Behavior) -> Result<()>;

    /// Query behaviors by filter
    fn query_behaviors(
        &self,
        cancel: &CancellationToken,
        filter: &BehaviorFilter,
    ) -> Result<Vec<Behavior>>;

    /// Number of stored behaviors
    fn count_behaviors(&self, cancel: &CancellationToken) -> Result<i64>;

    /// Upsert an edge on its (source, target, kind) triple. Self-loops are
    /// a conflict; weights are clamped.
    fn add_edge(&self, cancel: &CancellationToken, edge: &GraphEdge) -> Result<()>;

    /// Fetch one edge by its triple
    fn get_edge(
        &self,
        cancel: &CancellationToken,
        source: &str,
        target: &str,
        kind: EdgeKind,
    ) -> Result<Option<GraphEdge>>;

    /// Edges incident to a node, optionally filtered by kind
    fn get_edges(
        &self,
        cancel: &CancellationToken,
        node_id: &str,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<GraphEdge>>;

    /// Remove one edge; returns whether it existed
    fn remove_edge(
        &self,
        cancel: &CancellationToken,
        source: &str,
        target: &str,
        kind: EdgeKind,
    ) -> Result<bool>;

    /// Number of stored edges
    fn count_edges(&self, cancel: &CancellationToken) -> Result<i64>;

    /// Apply every weight update in one transaction; unknown triples are
    /// skipped with a warning. Returns the number of rows updated.
    fn batch_update_edge_weights(
        &self,
        cancel: &CancellationToken,
        updates: &[EdgeWeightUpdate],
    ) -> Result<usize>;

    /// One transaction covering a session's Hebbian learning: apply weight
    /// updates, and for each candidate consult/advance its creation-gate
    /// counter (sliding `window`), creating the edge once the counter
    /// reaches `gate`. Counter rows are deleted when their edge is created.
    fn apply_hebbian_batch(
        &self,
        cancel: &CancellationToken,
        updates: &[EdgeWeightUpdate],
        candidates: &[CoActivationCandidate],
        gate: u32,
        window: chrono::Duration,
    ) -> Result<HebbianReport>;

    /// Current creation-gate counter for a canonical pair key (diagnostics)
    fn co_activation_count(&self, cancel: &CancellationToken, pair_key: &str) -> Result<u32>;

    /// Set `last_activated = max(existing, now)` on every edge incident to
    /// any of the given nodes. Returns the number of edges touched.
    fn touch_edges(
        &self,
        cancel: &CancellationToken,
        node_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize>;

    /// Bump a behavior's activation counters. Missing nodes are ignored.
    fn record_activation_hit(
        &self,
        cancel: &CancellationToken,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Re-point every edge incident to `from` at `to`, dropping would-be
    /// self-loops. Returns the number of edges moved.
    fn redirect_edges(&self, cancel: &CancellationToken, from: &str, to: &str) -> Result<usize>;

    /// Persist a correction record (upsert on id)
    fn save_correction(&self, cancel: &CancellationToken, correction: &Correction) -> Result<()>;

    /// Fetch a correction by id
    fn get_correction(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Correction>>;

    /// Mark a correction consumed by the learning loop
    fn mark_correction_processed(&self, cancel: &CancellationToken, id: &str) -> Result<()>;

    /// Dump the full graph (behaviors + edges)
    fn export_graph(&self, cancel: &CancellationToken) -> Result<GraphDump>;

    /// Replace the full graph from a dump, in one transaction
    fn import_graph(&self, cancel: &CancellationToken, dump: &GraphDump) -> Result<()>;
}

/// Canonical pair key for co-activation counters: ids sorted, joined by `|`
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}|{}", a, b)
    } else {
        format!("{}|{}", b, a)
    }
}
