//! Learning loop
//!
//! Orchestrates correction → behavior: extract a candidate, classify its
//! scope, try duplicate auto-merge, otherwise place it in the graph, run
//! the review gate, and record the decision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::{Behavior, BehaviorKind, BehaviorScope, Correction, SourceType, Tagger};
use crate::similarity::SimilarityScorer;
use crate::store::GraphStore;

use super::decision_log::{DecisionEvent, DecisionLog, DecisionOutcome};
use super::dedup::{Deduplicator, DuplicateMatch};
use super::extractor::Extractor;
use super::placer::{GraphPlacer, Placement, PlacementAction, SimilarityMatch, MERGE_THRESHOLD};
use super::LearningError;

// ============================================================================
// CONFIG
// ============================================================================

/// Learning loop configuration
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Whether near-duplicates merge without review
    pub auto_merge: bool,
    /// Similarity at or above which auto-merge fires (inclusive: 0 always
    /// fires when a duplicate exists, 1 requires an exact match)
    pub auto_merge_threshold: f64,
    /// Placement confidence at or above which a reviewless behavior is
    /// auto-accepted
    pub auto_accept_threshold: f64,
    /// Placement confidence below which review is forced
    pub review_confidence_floor: f64,
    /// Overrides the scope classified from the candidate's predicate
    pub scope_override: Option<BehaviorScope>,
    /// Task labels allowed to scope a `when` predicate
    pub known_tasks: BTreeSet<String>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            auto_merge: true,
            auto_merge_threshold: 0.9,
            auto_accept_threshold: 0.8,
            review_confidence_floor: 0.6,
            scope_override: None,
            known_tasks: ["testing", "refactoring", "debugging", "code-review", "documentation", "deployment"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Outcome of processing one correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningResult {
    /// Id of the extracted behavior (persisted unless merged away)
    pub behavior_id: String,
    /// Placement action taken
    pub action: String,
    /// Scope classification
    pub scope: BehaviorScope,
    /// Whether the candidate folded into an existing behavior
    pub merged_into_existing: bool,
    /// Surviving behavior id when merged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_behavior_id: Option<String>,
    /// Similarity that drove the merge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_similarity: Option<f64>,
    /// Whether a human must review before the behavior is trusted
    pub requires_review: bool,
    /// Reasons the review gate fired
    #[serde(default)]
    pub review_reasons: Vec<String>,
    /// Whether the behavior was accepted without review
    pub auto_accepted: bool,
    /// Every existing behavior scoring above the similar threshold
    #[serde(skip)]
    pub similar: Vec<SimilarityMatch>,
}

// ============================================================================
// LEARNING LOOP
// ============================================================================

/// The correction→behavior orchestrator
pub struct LearningLoop {
    store: Arc<dyn GraphStore>,
    extractor: Extractor,
    placer: GraphPlacer,
    dedup: Option<Arc<dyn Deduplicator>>,
    log: Option<DecisionLog>,
    config: LearningConfig,
}

impl LearningLoop {
    /// Loop over a store with rule-based similarity and no deduplicator
    pub fn new(store: Arc<dyn GraphStore>, config: LearningConfig) -> Self {
        Self::with_scorer(store, config, SimilarityScorer::default())
    }

    /// Loop with a custom similarity scorer
    pub fn with_scorer(
        store: Arc<dyn GraphStore>,
        config: LearningConfig,
        scorer: SimilarityScorer,
    ) -> Self {
        let extractor = Extractor::new(Tagger::default(), config.known_tasks.clone());
        let placer = GraphPlacer::new(store.clone(), scorer);
        Self {
            store,
            extractor,
            placer,
            dedup: None,
            log: None,
            config,
        }
    }

    /// Attach a deduplicator
    pub fn with_deduplicator(mut self, dedup: Arc<dyn Deduplicator>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Attach a decision log
    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Process one correction end to end.
    ///
    /// Extraction failures reject the correction without persisting
    /// anything; store failures surface unchanged.
    pub fn process_correction(
        &self,
        cancel: &CancellationToken,
        correction: &Correction,
    ) -> Result<LearningResult, LearningError> {
        let candidate = self.extractor.extract(correction)?;
        let scope = self.config.scope_override.unwrap_or_else(|| candidate.scope());

        self.store.save_correction(cancel, correction)?;

        // Duplicate auto-merge short-circuits placement entirely.
        if let Some(dedup) = &self.dedup {
            let matches = dedup.find_duplicates(cancel, &candidate)?;
            if let Some(best) = matches.first() {
                if self.config.auto_merge && best.similarity >= self.config.auto_merge_threshold {
                    return self.finish_merge(cancel, correction, &candidate, scope, &matches);
                }
            }
        }

        let placement = self.placer.place(cancel, &candidate)?;
        let best_similarity = placement.similar.first().map(|m| m.similarity);

        if placement.action == PlacementAction::Merge
            && self.config.auto_merge
            && best_similarity.is_some_and(|s| s >= self.config.auto_merge_threshold)
        {
            let matches: Vec<DuplicateMatch> = placement
                .similar
                .iter()
                .map(|m| DuplicateMatch {
                    behavior_id: m.behavior_id.clone(),
                    similarity: m.similarity,
                })
                .collect();
            return self.finish_merge(cancel, correction, &candidate, scope, &matches);
        }

        self.store.add_behavior(cancel, &candidate)?;
        for edge in &placement.proposed_edges {
            self.store.add_edge(cancel, edge)?;
        }
        self.store.mark_correction_processed(cancel, &correction.id)?;

        let result = self.gate(&candidate, &placement, scope);
        self.log_decision(
            if result.auto_accepted {
                DecisionOutcome::AutoAccept
            } else {
                DecisionOutcome::ReviewRequired
            },
            &candidate.id,
            placement.confidence,
            self.config.auto_accept_threshold,
            result.review_reasons.clone(),
        );

        tracing::info!(
            behavior = %candidate.id,
            action = result.action,
            auto_accepted = result.auto_accepted,
            requires_review = result.requires_review,
            "correction processed"
        );
        Ok(result)
    }

    /// Approve a pending behavior: record the reviewer and persist.
    pub fn approve_pending(
        &self,
        cancel: &CancellationToken,
        behavior_id: &str,
        approver: &str,
    ) -> Result<Behavior, LearningError> {
        let mut behavior = self
            .store
            .get_behavior(cancel, behavior_id)?
            .ok_or_else(|| LearningError::UnknownBehavior(behavior_id.to_string()))?;
        behavior.provenance.approved_by = Some(approver.to_string());
        behavior.provenance.rejected_by = None;
        behavior.stats.times_confirmed += 1;
        behavior.stats.last_confirmed = Some(chrono::Utc::now());
        behavior.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, &behavior)?;

        self.log_decision(
            DecisionOutcome::Approved,
            behavior_id,
            behavior.confidence,
            self.config.auto_accept_threshold,
            vec![],
        );
        Ok(behavior)
    }

    /// Reject a pending behavior: deprecate it with the reviewer's reason.
    pub fn reject_pending(
        &self,
        cancel: &CancellationToken,
        behavior_id: &str,
        rejector: &str,
        reason: &str,
    ) -> Result<Behavior, LearningError> {
        let mut behavior = self
            .store
            .get_behavior(cancel, behavior_id)?
            .ok_or_else(|| LearningError::UnknownBehavior(behavior_id.to_string()))?;
        behavior.kind = BehaviorKind::Deprecated;
        behavior.provenance.rejected_by = Some(rejector.to_string());
        behavior.provenance.review_note = Some(reason.to_string());
        behavior.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, &behavior)?;

        self.log_decision(
            DecisionOutcome::Rejected,
            behavior_id,
            behavior.confidence,
            self.config.auto_accept_threshold,
            vec![reason.to_string()],
        );
        Ok(behavior)
    }

    fn finish_merge(
        &self,
        cancel: &CancellationToken,
        correction: &Correction,
        candidate: &Behavior,
        scope: BehaviorScope,
        matches: &[DuplicateMatch],
    ) -> Result<LearningResult, LearningError> {
        let Some(best) = matches.first() else {
            return Err(LearningError::Extraction(
                "merge requested with no duplicate matches".to_string(),
            ));
        };
        let survivor = match &self.dedup {
            Some(dedup) => dedup.merge_duplicates(cancel, matches, candidate)?,
            None => self.merge_into(cancel, &best.behavior_id, candidate)?,
        };
        self.store.mark_correction_processed(cancel, &correction.id)?;

        self.log_decision(
            DecisionOutcome::AutoAccept,
            &survivor,
            best.similarity,
            self.config.auto_merge_threshold,
            vec!["auto-merged into existing behavior".to_string()],
        );

        Ok(LearningResult {
            behavior_id: candidate.id.clone(),
            action: PlacementAction::Merge.as_str().to_string(),
            scope,
            merged_into_existing: true,
            merged_behavior_id: Some(survivor),
            merge_similarity: Some(best.similarity),
            requires_review: false,
            review_reasons: vec![],
            auto_accepted: true,
            similar: matches
                .iter()
                .map(|m| SimilarityMatch {
                    behavior_id: m.behavior_id.clone(),
                    similarity: m.similarity,
                })
                .collect(),
        })
    }

    /// Fallback merge when no deduplicator is configured: the existing
    /// behavior absorbs the candidate's tags and a confirmation.
    fn merge_into(
        &self,
        cancel: &CancellationToken,
        target_id: &str,
        candidate: &Behavior,
    ) -> Result<String, LearningError> {
        let mut primary = self
            .store
            .get_behavior(cancel, target_id)?
            .ok_or_else(|| LearningError::UnknownBehavior(target_id.to_string()))?;
        let mut tags = primary.content.tags.clone();
        tags.extend(candidate.content.tags.iter().cloned());
        primary.content.set_tags(tags);
        primary.confidence = primary.confidence.max(candidate.confidence);
        primary.provenance.source_type = SourceType::Merged;
        primary.stats.times_confirmed += 1;
        primary.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, &primary)?;
        Ok(primary.id.clone())
    }

    /// Review gate per the acceptance policy.
    fn gate(&self, candidate: &Behavior, placement: &Placement, scope: BehaviorScope) -> LearningResult {
        let mut reasons = Vec::new();
        if candidate.kind == BehaviorKind::Constraint {
            reasons.push("Constraints require human review".to_string());
        }
        if placement.confidence < self.config.review_confidence_floor {
            reasons.push(format!(
                "Low placement confidence ({:.2})",
                placement.confidence
            ));
        }
        if placement
            .similar
            .iter()
            .any(|m| m.similarity >= MERGE_THRESHOLD)
        {
            reasons.push("Highly similar behavior exists".to_string());
        }
        if placement.action == PlacementAction::Merge {
            reasons.push("Merge requires review".to_string());
        }

        let requires_review = !reasons.is_empty();
        let auto_accepted =
            !requires_review && placement.confidence >= self.config.auto_accept_threshold;

        LearningResult {
            behavior_id: candidate.id.clone(),
            action: placement.action.as_str().to_string(),
            scope,
            merged_into_existing: false,
            merged_behavior_id: None,
            merge_similarity: None,
            requires_review,
            review_reasons: reasons,
            auto_accepted,
            similar: placement.similar.clone(),
        }
    }

    fn log_decision(
        &self,
        outcome: DecisionOutcome,
        behavior_id: &str,
        confidence: f64,
        threshold: f64,
        reasons: Vec<String>,
    ) {
        let Some(log) = &self.log else {
            return;
        };
        let event = DecisionEvent::new(outcome, behavior_id, confidence, threshold, reasons);
        if let Err(e) = log.append(&event) {
            tracing::warn!(error = %e, "failed to append decision log event");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
