//! Graph edges
//!
//! Directed, weighted relationships between behaviors. User-facing kinds
//! express curation semantics; the `co-activated` kind is created and
//! maintained exclusively by the Hebbian learner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest weight an edge may carry
pub const MIN_EDGE_WEIGHT: f64 = 0.01;

/// Largest weight an edge may carry
pub const MAX_EDGE_WEIGHT: f64 = 0.95;

/// Clamp a weight into the legal range. Non-finite input collapses to the
/// minimum so NaN/∞ can never be persisted.
pub fn clamp_weight(w: f64) -> f64 {
    if !w.is_finite() {
        return MIN_EDGE_WEIGHT;
    }
    w.clamp(MIN_EDGE_WEIGHT, MAX_EDGE_WEIGHT)
}

// ============================================================================
// EDGE KIND
// ============================================================================

/// Kind of relationship between behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Source presupposes target
    Requires,
    /// Source takes precedence over target where both apply
    Overrides,
    /// Source and target give contradictory guidance
    Conflicts,
    /// Source and target say similar things
    SimilarTo,
    /// Source was derived from target (correction lineage)
    LearnedFrom,
    /// System-maintained Hebbian co-activation link
    CoActivated,
}

impl EdgeKind {
    /// All kinds
    pub const ALL: &'static [EdgeKind] = &[
        EdgeKind::Requires,
        EdgeKind::Overrides,
        EdgeKind::Conflicts,
        EdgeKind::SimilarTo,
        EdgeKind::LearnedFrom,
        EdgeKind::CoActivated,
    ];

    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Requires => "requires",
            EdgeKind::Overrides => "overrides",
            EdgeKind::Conflicts => "conflicts",
            EdgeKind::SimilarTo => "similar-to",
            EdgeKind::LearnedFrom => "learned-from",
            EdgeKind::CoActivated => "co-activated",
        }
    }

    /// Kinds that users may create and curate. `co-activated` is reserved
    /// for the Hebbian learner.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, EdgeKind::CoActivated)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "requires" => Ok(EdgeKind::Requires),
            "overrides" => Ok(EdgeKind::Overrides),
            "conflicts" => Ok(EdgeKind::Conflicts),
            "similar-to" | "similar_to" => Ok(EdgeKind::SimilarTo),
            "learned-from" | "learned_from" => Ok(EdgeKind::LearnedFrom),
            "co-activated" | "co_activated" => Ok(EdgeKind::CoActivated),
            _ => Err(format!("Unknown edge kind: {}", s)),
        }
    }
}

// ============================================================================
// GRAPH EDGE
// ============================================================================

/// A directed, weighted edge in the behavior graph.
///
/// (source, target, kind) is unique in the store; inserting over an existing
/// triple updates weight and `last_activated` in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship kind
    pub kind: EdgeKind,
    /// Weight in [[`MIN_EDGE_WEIGHT`], [`MAX_EDGE_WEIGHT`]]
    pub weight: f64,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
    /// Last session in which both endpoints participated; absent means the
    /// edge behaves as freshly touched (no temporal decay)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activated: Option<DateTime<Utc>>,
}

impl GraphEdge {
    /// New edge with a clamped weight and no activation history
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight: clamp_weight(weight),
            created_at: Utc::now(),
            last_activated: None,
        }
    }

    /// True when source and target are the same node
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// The endpoint opposite `node`, when `node` is an endpoint
    pub fn neighbor_of(&self, node: &str) -> Option<&str> {
        if self.source == node {
            Some(&self.target)
        } else if self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Weight seen by the spreading engine after temporal decay.
    ///
    /// `rate` is per hour of dormancy since `last_activated`. A missing
    /// timestamp decays nothing; the stored weight is never modified.
    pub fn effective_weight(&self, now: DateTime<Utc>, rate: f64) -> f64 {
        match self.last_activated {
            None => self.weight,
            Some(touched) => {
                let hours = (now - touched).num_seconds() as f64 / 3600.0;
                self.weight * (-rate * hours.max(0.0)).exp()
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
