//! Session pipeline
//!
//! The facade one turn runs through: select seeds from the context
//! snapshot, spread activation, then (optionally) learn from the session —
//! Hebbian updates, edge touches, activation-hit stats — and plan the
//! injection when a token budget is given.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::ContextSnapshot;
use crate::store::{GraphStore, HebbianReport, Result};

use super::hebbian::{extract_pairs, HebbianConfig, HebbianLearner};
use super::seeds::{Seed, SeedSelector};
use super::spreading::{ActivationConfig, ActivationResult, SpreadingEngine};
use super::tiering::{InjectionPlan, TieringConfig, TieringPlanner};

/// Per-session options
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Run the Hebbian learner and stats recorders after activation
    pub learn: bool,
    /// Allow the learner to create new co-activated edges
    pub create_edges: bool,
    /// Plan the injection against this many tokens
    pub token_budget: Option<usize>,
}

impl SessionOptions {
    /// Read-only session: activate, learn nothing
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Learning session with edge creation enabled
    pub fn learning() -> Self {
        Self {
            learn: true,
            create_edges: true,
            token_budget: None,
        }
    }

    /// Attach a token budget
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

/// Everything a session produced
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    /// Seeds the snapshot selected
    pub seeds: Vec<Seed>,
    /// Activated behaviors, strongest first
    pub results: Vec<ActivationResult>,
    /// Hebbian batch report when learning ran
    pub hebbian: Option<HebbianReport>,
    /// Injection plan when a budget was given
    pub plan: Option<InjectionPlan>,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// The turn-time facade
pub struct Pipeline {
    store: Arc<dyn GraphStore>,
    seeds: SeedSelector,
    engine: SpreadingEngine,
    hebbian: HebbianLearner,
    planner: TieringPlanner,
}

impl Pipeline {
    /// Pipeline over a store with the given component configurations
    pub fn new(
        store: Arc<dyn GraphStore>,
        activation: ActivationConfig,
        hebbian: HebbianConfig,
        tiering: TieringConfig,
    ) -> Self {
        Self {
            seeds: SeedSelector::new(store.clone()),
            engine: SpreadingEngine::new(store.clone(), activation),
            hebbian: HebbianLearner::new(store.clone(), hebbian),
            planner: TieringPlanner::new(tiering),
            store,
        }
    }

    /// Pipeline with default configurations
    pub fn with_defaults(store: Arc<dyn GraphStore>) -> Self {
        Self::new(
            store,
            ActivationConfig::default(),
            HebbianConfig::default(),
            TieringConfig::default(),
        )
    }

    /// Seed selection and spreading only.
    pub fn run(
        &self,
        cancel: &CancellationToken,
        snapshot: &ContextSnapshot,
    ) -> Result<Vec<ActivationResult>> {
        let seeds = self.seeds.select(cancel, snapshot)?;
        self.engine.activate(cancel, &seeds)
    }

    /// Full session: activate, then learn and plan per `options`.
    pub fn run_session(
        &self,
        cancel: &CancellationToken,
        snapshot: &ContextSnapshot,
        options: &SessionOptions,
    ) -> Result<SessionOutcome> {
        let seeds = self.seeds.select(cancel, snapshot)?;
        let results = self.engine.activate(cancel, &seeds)?;

        let mut outcome = SessionOutcome {
            seeds,
            results,
            hebbian: None,
            plan: None,
        };

        if options.learn {
            let seed_ids: HashSet<String> =
                outcome.seeds.iter().map(|s| s.id.clone()).collect();
            let pairs = extract_pairs(&outcome.results, &seed_ids, self.hebbian.config());
            let report = self.hebbian.apply(cancel, &pairs, options.create_edges)?;
            outcome.hebbian = Some(report);

            let now = Utc::now();
            let activated: Vec<String> =
                outcome.results.iter().map(|r| r.id.clone()).collect();
            self.store.touch_edges(cancel, &activated, now)?;
            for id in &activated {
                self.store.record_activation_hit(cancel, id, now)?;
            }
        }

        if let Some(budget) = options.token_budget {
            let mut behaviors = HashMap::new();
            for result in &outcome.results {
                if let Some(behavior) = self.store.get_behavior(cancel, &result.id)? {
                    behaviors.insert(result.id.clone(), behavior);
                }
            }
            outcome.plan = Some(self.planner.map(&outcome.results, &behaviors, budget));
        }

        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================
