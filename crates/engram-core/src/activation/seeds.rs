//! Seed selection
//!
//! Maps a context snapshot onto the behaviors whose predicates it
//! satisfies. Match specificity (number of confirmed keys) sets the initial
//! activation; unscoped behaviors always seed at a low floor so cold rules
//! still compete for attention.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::{ContextSnapshot, WhenMatch};
use crate::store::{BehaviorFilter, GraphStore, Result};

/// An activation seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Behavior id
    pub id: String,
    /// Initial activation
    pub activation: f64,
    /// Human-readable origin label, e.g. `context:language=python,task=testing`
    pub source: String,
}

/// Initial activation as a pure function of specificity
pub fn activation_for_specificity(specificity: usize) -> f64 {
    match specificity {
        0 => 0.3,
        1 => 0.4,
        2 => 0.6,
        3 => 0.8,
        n => (0.8 + 0.1 * (n as f64 - 3.0)).min(1.0),
    }
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Context → seeds
pub struct SeedSelector {
    store: Arc<dyn GraphStore>,
}

impl SeedSelector {
    /// Selector over a store
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Evaluate every active behavior against the snapshot.
    ///
    /// Behaviors with any contradicted key are excluded; the rest become
    /// seeds with activation mapped from specificity, sorted descending
    /// (ties broken by id for determinism).
    pub fn select(
        &self,
        cancel: &CancellationToken,
        snapshot: &ContextSnapshot,
    ) -> Result<Vec<Seed>> {
        let behaviors = self
            .store
            .query_behaviors(cancel, &BehaviorFilter::active())?;

        let mut seeds = Vec::new();
        for behavior in &behaviors {
            match behavior.when.matches_snapshot(snapshot) {
                WhenMatch::Excluded => {}
                WhenMatch::Matched {
                    specificity,
                    confirmed,
                } => {
                    let source = if specificity == 0 {
                        "context:always".to_string()
                    } else {
                        let pairs: Vec<String> = confirmed
                            .iter()
                            .map(|(k, v)| format!("{}={}", k, v))
                            .collect();
                        format!("context:{}", pairs.join(","))
                    };
                    seeds.push(Seed {
                        id: behavior.id.clone(),
                        activation: activation_for_specificity(specificity),
                        source,
                    });
                }
            }
        }

        seeds.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        tracing::debug!(
            candidates = behaviors.len(),
            seeds = seeds.len(),
            "seed selection finished"
        );
        Ok(seeds)
    }
}

// ============================================================================
// TESTS
// ============================================================================
