//! Graph placer
//!
//! Decides where a candidate behavior lands in the graph: merge into a
//! near-duplicate, specialize an existing behavior, or create a new node.
//! Also proposes the structural edges implied by predicate containment and
//! similarity.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::{clamp_weight, Behavior, EdgeKind, GraphEdge};
use crate::similarity::SimilarityScorer;
use crate::store::{BehaviorFilter, GraphStore};

use super::LearningError;

/// Similarity above which the placer proposes merging
pub const MERGE_THRESHOLD: f64 = 0.9;

/// Similarity above which the placer proposes specialization (with a
/// strictly-more-specific predicate)
pub const SPECIALIZE_THRESHOLD: f64 = 0.7;

/// Similarity range lower bound for proposed `similar-to` edges and for
/// reporting a match at all
pub const SIMILAR_THRESHOLD: f64 = 0.5;

/// Default weight of proposed `overrides` edges
const OVERRIDE_EDGE_WEIGHT: f64 = 0.7;

/// What to do with the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementAction {
    /// Persist as a new node
    Create,
    /// Fold into an existing near-duplicate
    Merge,
    /// Persist as a more specific sibling of an existing behavior
    Specialize,
}

impl PlacementAction {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementAction::Create => "create",
            PlacementAction::Merge => "merge",
            PlacementAction::Specialize => "specialize",
        }
    }
}

/// An existing behavior scored against the candidate
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    /// Existing behavior id
    pub behavior_id: String,
    /// Composite similarity
    pub similarity: f64,
}

/// Placement decision for a candidate behavior
#[derive(Debug, Clone)]
pub struct Placement {
    /// Chosen action
    pub action: PlacementAction,
    /// Existing behavior targeted by merge/specialize
    pub target_id: Option<String>,
    /// Confidence in the decision
    pub confidence: f64,
    /// Structural edges to create alongside the candidate
    pub proposed_edges: Vec<GraphEdge>,
    /// Every existing behavior scoring above [`SIMILAR_THRESHOLD`]
    pub similar: Vec<SimilarityMatch>,
}

// ============================================================================
// PLACER
// ============================================================================

/// Scores a candidate against when-overlapping behaviors and derives the
/// placement decision
pub struct GraphPlacer {
    store: Arc<dyn GraphStore>,
    scorer: SimilarityScorer,
}

impl GraphPlacer {
    /// Placer over a store with a configured scorer
    pub fn new(store: Arc<dyn GraphStore>, scorer: SimilarityScorer) -> Self {
        Self { store, scorer }
    }

    /// Decide placement for `candidate`.
    ///
    /// Only behaviors whose predicate could overlap the candidate's are
    /// considered (permissive overlap: either side unscoped or any shared
    /// key).
    pub fn place(
        &self,
        cancel: &CancellationToken,
        candidate: &Behavior,
    ) -> Result<Placement, LearningError> {
        let neighbors = self.store.query_behaviors(
            cancel,
            &BehaviorFilter::active().overlapping(candidate.when.clone()),
        )?;

        if neighbors.is_empty() {
            let empty_store = self.store.count_behaviors(cancel)? == 0;
            return Ok(Placement {
                action: PlacementAction::Create,
                target_id: None,
                confidence: if empty_store { 0.9 } else { 0.7 },
                proposed_edges: Vec::new(),
                similar: Vec::new(),
            });
        }

        let mut scored: Vec<(Behavior, f64)> = neighbors
            .into_iter()
            .filter(|n| n.id != candidate.id)
            .map(|n| {
                let s = self.scorer.score(candidate, &n);
                (n, s)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        let mut proposed_edges = Vec::new();
        let mut similar = Vec::new();
        for (neighbor, score) in &scored {
            if candidate.when.is_more_specific_than(&neighbor.when) {
                proposed_edges.push(override_edge(&candidate.id, &neighbor.id));
            } else if neighbor.when.is_more_specific_than(&candidate.when) {
                proposed_edges.push(override_edge(&neighbor.id, &candidate.id));
            }
            if (SIMILAR_THRESHOLD..MERGE_THRESHOLD).contains(score) {
                proposed_edges.push(GraphEdge::new(
                    &candidate.id,
                    &neighbor.id,
                    EdgeKind::SimilarTo,
                    clamp_weight(*score),
                ));
            }
            if *score > SIMILAR_THRESHOLD {
                similar.push(SimilarityMatch {
                    behavior_id: neighbor.id.clone(),
                    similarity: *score,
                });
            }
        }

        let (action, target_id, confidence) = match scored.first() {
            Some((best, score)) if *score > MERGE_THRESHOLD => {
                (PlacementAction::Merge, Some(best.id.clone()), 0.5)
            }
            Some((best, score))
                if *score > SPECIALIZE_THRESHOLD
                    && candidate.when.is_more_specific_than(&best.when) =>
            {
                (PlacementAction::Specialize, Some(best.id.clone()), 0.6)
            }
            _ => (PlacementAction::Create, None, 0.7),
        };

        Ok(Placement {
            action,
            target_id,
            confidence,
            proposed_edges,
            similar,
        })
    }
}

fn override_edge(source: &str, target: &str) -> GraphEdge {
    GraphEdge::new(source, target, EdgeKind::Overrides, OVERRIDE_EDGE_WEIGHT)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{WhenPredicate, WhenValue};
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn test_placer() -> (GraphPlacer, Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(Some(dir.path().join("test.db"))).unwrap());
        let placer = GraphPlacer::new(store.clone(), SimilarityScorer::default());
        (placer, store, dir)
    }

    fn behavior(canonical: &str, when: WhenPredicate) -> Behavior {
        let id = Behavior::id_for(canonical, canonical);
        let mut b = Behavior::new(id, "learned/test", canonical);
        b.when = when;
        b
    }

    #[test]
    fn test_empty_store_creates_with_high_confidence() {
        let (placer, _store, _dir) = test_placer();
        let cancel = CancellationToken::new();
        let candidate = behavior("use uv instead of pip", WhenPredicate::new());

        let placement = placer.place(&cancel, &candidate).unwrap();
        assert_eq!(placement.action, PlacementAction::Create);
        assert!((placement.confidence - 0.9).abs() < 1e-12);
        assert!(placement.similar.is_empty());
    }

    #[test]
    fn test_near_duplicate_proposes_merge() {
        let (placer, store, _dir) = test_placer();
        let cancel = CancellationToken::new();

        let when = WhenPredicate::new().with("language", WhenValue::scalar("python"));
        let existing = behavior("use uv instead of pip", when.clone());
        store.add_behavior(&cancel, &existing).unwrap();

        let candidate = behavior("use uv instead of pip please", when);
        let placement = placer.place(&cancel, &candidate).unwrap();
        assert_eq!(placement.action, PlacementAction::Merge);
        assert_eq!(placement.target_id.as_deref(), Some(existing.id.as_str()));
        assert!((placement.confidence - 0.5).abs() < 1e-12);
        assert_eq!(placement.similar.len(), 1);
        assert!(placement.similar[0].similarity > 0.8);
    }

    #[test]
    fn test_more_specific_overlap_proposes_specialize_and_override() {
        let (placer, store, _dir) = test_placer();
        let cancel = CancellationToken::new();

        let wide = behavior(
            "run the linter before committing changes",
            WhenPredicate::new().with("language", WhenValue::scalar("python")),
        );
        store.add_behavior(&cancel, &wide).unwrap();

        let narrow = behavior(
            "run the linter before committing any changes",
            WhenPredicate::new()
                .with("language", WhenValue::scalar("python"))
                .with("task", WhenValue::scalar("refactoring")),
        );
        let placement = placer.place(&cancel, &narrow).unwrap();
        assert_eq!(placement.action, PlacementAction::Specialize);
        assert_eq!(placement.target_id.as_deref(), Some(wide.id.as_str()));
        assert!((placement.confidence - 0.6).abs() < 1e-12);

        // narrow --overrides--> wide proposed
        assert!(placement
            .proposed_edges
            .iter()
            .any(|e| e.kind == EdgeKind::Overrides
                && e.source == narrow.id
                && e.target == wide.id));
    }

    #[test]
    fn test_moderate_similarity_proposes_similar_to() {
        let (placer, store, _dir) = test_placer();
        let cancel = CancellationToken::new();

        let existing = behavior("run pytest before pushing code", WhenPredicate::new());
        store.add_behavior(&cancel, &existing).unwrap();

        let candidate = behavior("run pytest before merging code", WhenPredicate::new());
        let placement = placer.place(&cancel, &candidate).unwrap();

        assert_eq!(placement.action, PlacementAction::Create);
        assert!(placement
            .proposed_edges
            .iter()
            .any(|e| e.kind == EdgeKind::SimilarTo && e.target == existing.id));
    }

    #[test]
    fn test_disjoint_scopes_are_not_considered() {
        let (placer, store, _dir) = test_placer();
        let cancel = CancellationToken::new();

        let existing = behavior(
            "use uv instead of pip",
            WhenPredicate::new().with("branch", WhenValue::scalar("main")),
        );
        store.add_behavior(&cancel, &existing).unwrap();

        let candidate = behavior(
            "use uv instead of pip",
            WhenPredicate::new().with("language", WhenValue::scalar("python")),
        );
        let placement = placer.place(&cancel, &candidate).unwrap();
        // Same words, but disjoint non-empty scopes: the neighbor is never fetched
        assert_eq!(placement.action, PlacementAction::Create);
        assert!((placement.confidence - 0.7).abs() < 1e-12);
        assert!(placement.similar.is_empty());
    }
}
