//! Behavior similarity
//!
//! Rule-based composite of three signals, each in [0, 1] or a "missing"
//! sentinel that drops the signal out of the weighted sum:
//!
//! - when-overlap over predicate key/value pairs
//! - Jaccard over canonical-text word tokens
//! - Jaccard over tag sets
//!
//! An optional pluggable semantic comparator refines scores that already
//! look promising; comparator failures always fall back to the rule score.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::model::{jaccard, Behavior, WhenPredicate};

/// Sentinel for a missing similarity signal
pub const SENTINEL: f64 = -1.0;

/// Weight of the when-overlap signal
pub const WHEN_WEIGHT: f64 = 0.4;

/// Weight of the content signal
pub const CONTENT_WEIGHT: f64 = 0.6;

/// Weight of the tag signal
pub const TAG_WEIGHT: f64 = 0.2;

// ============================================================================
// SIGNALS
// ============================================================================

/// Overlap of two `when` predicates.
///
/// Returns [`SENTINEL`] when either side is unscoped or the key sets are
/// disjoint; otherwise `2 * matching_pairs / (|a| + |b|)`, where a pair
/// matches when the values share a candidate.
pub fn when_overlap(a: &WhenPredicate, b: &WhenPredicate) -> f64 {
    if a.is_empty() || b.is_empty() {
        return SENTINEL;
    }
    let shared: Vec<_> = a.iter().filter(|(k, _)| b.contains_key(k)).collect();
    if shared.is_empty() {
        return SENTINEL;
    }
    let matching = shared
        .iter()
        .filter(|(k, v)| b.get(k).is_some_and(|other| v.matches(other)))
        .count();
    2.0 * matching as f64 / (a.len() + b.len()) as f64
}

/// Jaccard over lowercased word tokens of two canonical texts.
///
/// Both empty is 1.0; exactly one empty is 0.0.
pub fn content_similarity(a: &str, b: &str) -> f64 {
    let ta = word_tokens(a);
    let tb = word_tokens(b);
    match (ta.is_empty(), tb.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => jaccard(&ta, &tb),
    }
}

/// Jaccard over tag sets; [`SENTINEL`] when either side has no tags
pub fn tag_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return SENTINEL;
    }
    jaccard(a, b)
}

fn word_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Weighted composite of the three signals with sentinel dropout.
///
/// Signals reporting [`SENTINEL`] are removed and the remaining weights
/// renormalized to sum to 1. All three missing yields 0.
pub fn rule_score(a: &Behavior, b: &Behavior) -> f64 {
    let signals = [
        (when_overlap(&a.when, &b.when), WHEN_WEIGHT),
        (
            content_similarity(&a.content.canonical, &b.content.canonical),
            CONTENT_WEIGHT,
        ),
        (
            tag_similarity(&a.content.tags, &b.content.tags),
            TAG_WEIGHT,
        ),
    ];

    let mut total_weight = 0.0;
    let mut sum = 0.0;
    for (value, weight) in signals {
        if value >= 0.0 {
            sum += value * weight;
            total_weight += weight;
        }
    }
    if total_weight == 0.0 {
        return 0.0;
    }
    (sum / total_weight).clamp(0.0, 1.0)
}

// ============================================================================
// SEMANTIC COMPARATOR (pluggable)
// ============================================================================

/// Verdict from a semantic comparator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticVerdict {
    /// Semantic similarity in [0, 1]
    pub similarity: f64,
    /// Whether the two behaviors express the same intent
    pub intent_match: bool,
    /// Whether the comparator recommends merging
    pub merge_candidate: bool,
}

/// Semantic comparator error; always recoverable by falling back to the
/// rule-based score
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    /// Comparator is configured but not currently reachable
    #[error("semantic comparator unavailable")]
    Unavailable,
    /// Comparator ran and failed
    #[error("semantic comparison failed: {0}")]
    Failed(String),
}

/// Optional deep-similarity capability. Implementations may call out to a
/// language model; the engine only ever treats them as a refinement.
pub trait SemanticComparator: Send + Sync {
    /// Whether the comparator can currently serve requests
    fn available(&self) -> bool;

    /// Compare two behaviors semantically
    fn compare_behaviors(
        &self,
        a: &Behavior,
        b: &Behavior,
    ) -> std::result::Result<SemanticVerdict, SemanticError>;
}

// ============================================================================
// SCORER
// ============================================================================

/// Configuration of the similarity composite
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Rule score above which the semantic comparator is consulted
    pub semantic_refine_threshold: f64,
    /// Weight of the rule score in the refined blend
    pub rule_weight: f64,
    /// Weight of the semantic score in the refined blend
    pub semantic_weight: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            semantic_refine_threshold: 0.5,
            rule_weight: 0.3,
            semantic_weight: 0.7,
        }
    }
}

/// Behavior-pair scorer combining the rule composite with the optional
/// semantic refinement
#[derive(Clone)]
pub struct SimilarityScorer {
    config: SimilarityConfig,
    comparator: Option<Arc<dyn SemanticComparator>>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(SimilarityConfig::default())
    }
}

impl SimilarityScorer {
    /// Rule-only scorer
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            comparator: None,
        }
    }

    /// Attach a semantic comparator
    pub fn with_comparator(mut self, comparator: Arc<dyn SemanticComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Final similarity of two behaviors.
    ///
    /// Rule score first; when a comparator is configured, available, and
    /// the rule score clears the refine threshold, the result blends
    /// `rule_weight * rule + semantic_weight * semantic`. Comparator errors
    /// are logged and swallowed.
    pub fn score(&self, a: &Behavior, b: &Behavior) -> f64 {
        let rule = rule_score(a, b);

        let Some(comparator) = &self.comparator else {
            return rule;
        };
        if rule <= self.config.semantic_refine_threshold || !comparator.available() {
            return rule;
        }

        match comparator.compare_behaviors(a, b) {
            Ok(verdict) => {
                let semantic = verdict.similarity.clamp(0.0, 1.0);
                (self.config.rule_weight * rule + self.config.semantic_weight * semantic)
                    .clamp(0.0, 1.0)
            }
            Err(e) => {
                tracing::debug!(error = %e, "semantic refinement failed, using rule score");
                rule
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
