//! Data model - behaviors, corrections, predicates, edges
//!
//! The durable vocabulary of the rule graph:
//! - Behavior nodes with when-predicates, content, provenance and stats
//! - Corrections as the raw input to learning
//! - Directed weighted edges with a fixed kind registry
//! - The sanitization boundary for user-supplied text
//! - The keyword tagger

mod behavior;
mod correction;
mod edge;
pub mod sanitize;
pub mod tagger;
mod when;

pub use behavior::{
    Behavior, BehaviorContent, BehaviorKind, BehaviorScope, BehaviorStats, Provenance, SourceType,
    StructuredContent, BEHAVIOR_ID_PREFIX, LEARNED_NAME_PREFIX,
};
pub use correction::{Correction, CORRECTION_ID_PREFIX};
pub use edge::{clamp_weight, EdgeKind, GraphEdge, MAX_EDGE_WEIGHT, MIN_EDGE_WEIGHT};
pub use tagger::{jaccard, tokenize, Tagger, MAX_TAGS};
pub use when::{keys, ContextSnapshot, WhenMatch, WhenPredicate, WhenValue};
