//! Full journeys: learn from corrections, then surface at turn time

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use engram_core::{
    ContextSnapshot, Correction, Direction, GraphStore, LearningConfig, LearningLoop, Pipeline,
    RuleBasedDeduplicator, SessionOptions, SimilarityScorer, WhenValue,
};
use engram_e2e_tests::harness::temp_store;

#[test]
fn learned_behavior_surfaces_in_matching_context_only() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let learner = LearningLoop::new(store.clone(), LearningConfig::default());
    let correction = Correction::new(
        "used pip install",
        "use uv instead",
        ContextSnapshot::new().with("file_language", WhenValue::scalar("python")),
    );
    let learned = learner.process_correction(&cancel, &correction).unwrap();

    let pipeline = Pipeline::with_defaults(store);

    // Matching context: the learned rule surfaces
    let python = ContextSnapshot::new().with("file_language", WhenValue::scalar("python"));
    let results = pipeline.run(&cancel, &python).unwrap();
    assert!(results.iter().any(|r| r.id == learned.behavior_id));

    // Contradicting context: it does not
    let go = ContextSnapshot::new().with("file_language", WhenValue::scalar("go"));
    let results = pipeline.run(&cancel, &go).unwrap();
    assert!(results.iter().all(|r| r.id != learned.behavior_id));
}

#[test]
fn learning_session_updates_stats_and_touches_edges() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    // Two related corrections produce two behaviors plus a similar-to edge
    let dedup = Arc::new(RuleBasedDeduplicator::new(
        store.clone(),
        SimilarityScorer::default(),
    ));
    let learner =
        LearningLoop::new(store.clone(), LearningConfig::default()).with_deduplicator(dedup);
    let python = ContextSnapshot::new().with("file_language", WhenValue::scalar("python"));

    let first = learner
        .process_correction(
            &cancel,
            &Correction::new("ran flake8 on the diff", "run ruff on the diff", python.clone()),
        )
        .unwrap();
    let second = learner
        .process_correction(
            &cancel,
            &Correction::new(
                "ran flake8 over everything",
                "run ruff over everything first",
                python.clone(),
            ),
        )
        .unwrap();
    assert!(!second.merged_into_existing);

    let pipeline = Pipeline::with_defaults(store.clone());
    let outcome = pipeline
        .run_session(&cancel, &python, &SessionOptions::learning())
        .unwrap();
    assert!(!outcome.results.is_empty());

    let reloaded = store.get_behavior(&cancel, &first.behavior_id).unwrap().unwrap();
    assert_eq!(reloaded.stats.times_activated, 1);

    // Any edge incident to an activated node is now stamped
    for edge in store
        .get_edges(&cancel, &second.behavior_id, Direction::Both, None)
        .unwrap()
    {
        assert!(edge.last_activated.is_some());
    }
}

#[test]
fn budgeted_session_plans_within_budget() {
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let learner = LearningLoop::new(store.clone(), LearningConfig::default());
    let python = ContextSnapshot::new().with("file_language", WhenValue::scalar("python"));

    let constraint = learner
        .process_correction(
            &cancel,
            &Correction::new(
                "committed the .env file",
                "never commit secrets to the repository",
                python.clone(),
            ),
        )
        .unwrap();
    learner
        .process_correction(
            &cancel,
            &Correction::new("used pip install", "use uv for installing packages", python.clone()),
        )
        .unwrap();

    let pipeline = Pipeline::with_defaults(store);
    let outcome = pipeline
        .run_session(
            &cancel,
            &python,
            &SessionOptions::read_only().with_budget(100),
        )
        .unwrap();

    let plan = outcome.plan.expect("plan for budgeted session");
    assert!(plan.total_tokens <= 100);

    // The constraint is present at summary tier or better
    let protected = plan
        .full
        .iter()
        .chain(plan.summarized.iter())
        .any(|t| t.behavior_id == constraint.behavior_id);
    assert!(protected, "constraints never drop below summary");
}
