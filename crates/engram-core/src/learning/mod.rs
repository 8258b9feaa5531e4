//! Learning loop - corrections become behaviors
//!
//! The upstream half of the engine: extract a candidate behavior from a
//! correction, decide where it lands in the graph (create, merge,
//! specialize), dedupe against near-identical rules, gate risky results for
//! human review, and log every decision.

mod decision_log;
mod dedup;
mod extractor;
mod placer;
mod processor;

pub use decision_log::{DecisionEvent, DecisionLog, DecisionOutcome};
pub use dedup::{
    DedupReport, Deduplicator, DuplicateMatch, RuleBasedDeduplicator, DUPLICATE_THRESHOLD,
};
pub use extractor::{Extractor, DEFAULT_LEARNED_CONFIDENCE};
pub use placer::{
    GraphPlacer, Placement, PlacementAction, SimilarityMatch, MERGE_THRESHOLD,
    SIMILAR_THRESHOLD, SPECIALIZE_THRESHOLD,
};
pub use processor::{LearningConfig, LearningLoop, LearningResult};

use crate::store::StoreError;

/// Learning loop error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    /// Store failure, surfaced unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Correction could not be turned into a valid behavior; nothing was
    /// persisted
    #[error("Extraction failed: {0}")]
    Extraction(String),
    /// Referenced behavior does not exist
    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),
}

/// Learning result type
pub type Result<T> = std::result::Result<T, LearningError>;
