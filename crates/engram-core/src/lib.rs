//! # Engram Core
//!
//! Behavior memory engine for AI agents. Corrections captured from users
//! become durable behavior rules in a weighted graph; at each agent turn a
//! subset of rules is surfaced for context injection, ranked by spreading
//! activation with Hebbian co-activation learning:
//!
//! - **Learning loop**: correction → behavior extraction, similarity-based
//!   placement (create / merge / specialize), deduplication, and a review
//!   gate with an append-only decision log
//! - **Spreading activation**: context-driven seed selection, synchronous
//!   propagation over weighted edges, sigmoid squashing, lateral inhibition
//! - **Hebbian learning**: Oja-stabilized weight updates over co-activated
//!   pairs with a creation gate and sliding window, so weights stay stable
//!   over thousands of sessions
//! - **Temporal dynamics**: dormant edges fade in influence but keep their
//!   stored weight, so long-dormant relationships recover on reactivation
//! - **Tiering**: token-budgeted injection planning with constraint
//!   protection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use engram_core::{
//!     ContextSnapshot, LearningConfig, LearningLoop, Pipeline, SessionOptions,
//!     SqliteStore, WhenValue,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(SqliteStore::new(None)?);
//! let cancel = CancellationToken::new();
//!
//! // Learn from a correction
//! let learner = LearningLoop::new(store.clone(), LearningConfig::default());
//! let correction = engram_core::Correction::new(
//!     "used pip install",
//!     "use uv instead",
//!     ContextSnapshot::new().with("file_language", WhenValue::scalar("python")),
//! );
//! let learned = learner.process_correction(&cancel, &correction)?;
//!
//! // Surface behaviors at turn time
//! let pipeline = Pipeline::with_defaults(store);
//! let snapshot = ContextSnapshot::new().with("file_language", WhenValue::scalar("python"));
//! let outcome = pipeline.run_session(&cancel, &snapshot, &SessionOptions::learning())?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod activation;
pub mod backup;
pub mod config;
pub mod learning;
pub mod model;
pub mod similarity;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use model::{
    clamp_weight, jaccard, keys, tokenize, Behavior, BehaviorContent, BehaviorKind, BehaviorScope,
    BehaviorStats, ContextSnapshot, Correction, EdgeKind, GraphEdge, Provenance, SourceType,
    StructuredContent, Tagger, WhenMatch, WhenPredicate, WhenValue, BEHAVIOR_ID_PREFIX,
    CORRECTION_ID_PREFIX, LEARNED_NAME_PREFIX, MAX_EDGE_WEIGHT, MAX_TAGS, MIN_EDGE_WEIGHT,
};

// Graph store
pub use store::{
    pair_key, BehaviorFilter, CoActivationCandidate, Direction, EdgeWeightUpdate, GraphDump,
    GraphStore, HebbianReport, SqliteStore, StoreError,
};

// Similarity
pub use similarity::{
    content_similarity, rule_score, tag_similarity, when_overlap, SemanticComparator,
    SemanticError, SemanticVerdict, SimilarityConfig, SimilarityScorer, SENTINEL,
};

// Learning loop
pub use learning::{
    DecisionEvent, DecisionLog, DecisionOutcome, DedupReport, Deduplicator, DuplicateMatch,
    Extractor, GraphPlacer, LearningConfig, LearningError, LearningLoop, LearningResult,
    Placement, PlacementAction, RuleBasedDeduplicator, SimilarityMatch,
    DEFAULT_LEARNED_CONFIDENCE,
};

// Activation engine
pub use activation::{
    activation_for_specificity, extract_pairs, oja_update, sigmoid, ActivationConfig,
    ActivationResult, CoActivationPair, HebbianConfig, HebbianLearner, InhibitionConfig,
    InjectionPlan, Pipeline, Seed, SeedSelector, SessionOptions, SessionOutcome, SpreadingEngine,
    StepSnapshot, Tier, TierAssignment, TieringConfig, TieringPlanner,
};

// Backup
pub use backup::{
    BackupConfig, BackupError, BackupHeader, BackupManager, RestoreReport, BACKUP_VERSION,
    MAX_BACKUP_BYTES, MAX_RESTORE_BYTES,
};

// Aggregate configuration
pub use config::EngramConfig;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ActivationConfig, ActivationResult, Behavior, BehaviorKind, BehaviorScope, ContextSnapshot,
        Correction, EdgeKind, GraphEdge, GraphStore, HebbianConfig, LearningConfig, LearningLoop,
        LearningResult, Pipeline, SessionOptions, SqliteStore, StoreError, WhenPredicate,
        WhenValue,
    };
}
