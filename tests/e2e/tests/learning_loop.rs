//! Learning loop journeys: correction in, behavior out

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use engram_core::{
    Behavior, BehaviorKind, BehaviorScope, ContextSnapshot, Correction, GraphStore,
    LearningConfig, LearningLoop, RuleBasedDeduplicator, SimilarityScorer, SourceType, WhenValue,
};
use engram_e2e_tests::harness::temp_store;

fn python_context() -> ContextSnapshot {
    ContextSnapshot::new()
        .with("file_language", WhenValue::scalar("python"))
        .with("file_path", WhenValue::scalar("requirements.txt"))
}

#[test]
fn extracted_behavior_has_expected_shape() {
    // A pip-vs-uv correction becomes a learned preference scoped to python
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();
    let learner = LearningLoop::new(store.clone(), LearningConfig::default());

    let correction = Correction::new("used pip install", "use uv instead", python_context());
    let result = learner.process_correction(&cancel, &correction).unwrap();

    let behavior = store
        .get_behavior(&cancel, &result.behavior_id)
        .unwrap()
        .expect("behavior persisted");

    assert!(behavior.id.starts_with("behavior-"));
    assert_eq!(behavior.kind, BehaviorKind::Preference);
    assert_eq!(behavior.name, "learned/use-uv-instead");
    assert_eq!(behavior.confidence, 0.6);
    assert_eq!(behavior.provenance.source_type, SourceType::Learned);
    assert_eq!(
        behavior.provenance.correction_id.as_deref(),
        Some(correction.id.as_str())
    );

    // language scope inferred; the bare file name scopes nothing
    assert_eq!(
        behavior.when.get("language"),
        Some(&WhenValue::scalar("python"))
    );
    assert!(!behavior.when.contains_key("file_path"));
    assert_eq!(result.scope, BehaviorScope::Global);
}

#[test]
fn behavior_ids_are_content_addressed() {
    // The same wrong/right pair in different contexts maps to one id
    let in_python = Correction::new("used pip install", "use uv instead", python_context());
    let no_context = Correction::new("used pip install", "use uv instead", ContextSnapshot::new());
    assert_eq!(
        Behavior::id_for(&in_python.agent_action, &in_python.corrected_action),
        Behavior::id_for(&no_context.agent_action, &no_context.corrected_action),
    );
    assert_eq!(in_python.id, no_context.id);
}

#[test]
fn constraint_correction_forces_review() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();
    let learner = LearningLoop::new(store.clone(), LearningConfig::default());

    let correction = Correction::new(
        "committed to main",
        "never commit directly to main branch",
        ContextSnapshot::new(),
    );
    let result = learner.process_correction(&cancel, &correction).unwrap();

    let behavior = store
        .get_behavior(&cancel, &result.behavior_id)
        .unwrap()
        .unwrap();
    assert_eq!(behavior.kind, BehaviorKind::Constraint);
    assert!(result.requires_review);
    assert!(!result.auto_accepted);
    assert!(result
        .review_reasons
        .iter()
        .any(|r| r.contains("Constraints require human review")));
}

#[test]
fn auto_merge_respects_threshold_boundary() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    // Threshold 0.9, auto-merge on: the repeat correction folds in
    let dedup = Arc::new(RuleBasedDeduplicator::new(
        store.clone(),
        SimilarityScorer::default(),
    ));
    let learner =
        LearningLoop::new(store.clone(), LearningConfig::default()).with_deduplicator(dedup);

    let first = learner
        .process_correction(
            &cancel,
            &Correction::new("ran pip install requests", "use uv instead of pip", python_context()),
        )
        .unwrap();
    assert!(!first.merged_into_existing);

    let repeat = learner
        .process_correction(
            &cancel,
            &Correction::new("ran pip install urllib3", "use uv instead of pip", python_context()),
        )
        .unwrap();
    assert!(repeat.merged_into_existing);
    assert_eq!(
        repeat.merged_behavior_id.as_deref(),
        Some(first.behavior_id.as_str())
    );
    assert!(repeat.merge_similarity.unwrap() >= 0.9);

    // The primary absorbed a confirmation
    let primary = store
        .get_behavior(&cancel, &first.behavior_id)
        .unwrap()
        .unwrap();
    assert_eq!(primary.stats.times_confirmed, 1);
}

#[test]
fn threshold_of_one_requires_exact_match() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let dedup = Arc::new(RuleBasedDeduplicator::new(
        store.clone(),
        SimilarityScorer::default(),
    ));
    let config = LearningConfig {
        auto_merge_threshold: 1.0,
        ..Default::default()
    };
    let learner = LearningLoop::new(store.clone(), config).with_deduplicator(dedup);

    learner
        .process_correction(
            &cancel,
            &Correction::new("ran pip install requests", "use uv instead of pip", python_context()),
        )
        .unwrap();

    // Similarity just under 1.0: no merge at the exact-match threshold
    let close = learner
        .process_correction(
            &cancel,
            &Correction::new(
                "ran pip install urllib3",
                "please use uv instead of pip",
                python_context(),
            ),
        )
        .unwrap();
    assert!(!close.merged_into_existing);
}

#[test]
fn approve_then_reject_updates_provenance_and_kind() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();
    let learner = LearningLoop::new(store.clone(), LearningConfig::default());

    let result = learner
        .process_correction(
            &cancel,
            &Correction::new(
                "pushed without checks",
                "never push without running the test suite",
                ContextSnapshot::new(),
            ),
        )
        .unwrap();
    assert!(result.requires_review);

    let approved = learner
        .approve_pending(&cancel, &result.behavior_id, "sam")
        .unwrap();
    assert_eq!(approved.provenance.approved_by.as_deref(), Some("sam"));

    let rejected = learner
        .reject_pending(&cancel, &result.behavior_id, "sam", "duplicate of CI policy")
        .unwrap();
    assert_eq!(rejected.kind, BehaviorKind::Deprecated);

    // Deprecated behaviors drop out of active queries
    let active = store
        .query_behaviors(&cancel, &engram_core::BehaviorFilter::active())
        .unwrap();
    assert!(active.iter().all(|b| b.id != result.behavior_id));
}
