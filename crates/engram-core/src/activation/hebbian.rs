//! Hebbian co-activation learning
//!
//! Behaviors that fire together in a session grow `co-activated` edges.
//! Weight updates follow Oja's rule, which is self-limiting: the forgetting
//! term `-B²·W` keeps weights from exploding no matter how many sessions
//! reinforce a pair. New edges only appear after a pair co-activates enough
//! times inside a sliding window (the creation gate), so one coincidental
//! session never wires the graph.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::{EdgeKind, MAX_EDGE_WEIGHT, MIN_EDGE_WEIGHT};
use crate::store::{
    CoActivationCandidate, EdgeWeightUpdate, GraphStore, HebbianReport, Result,
};

use super::spreading::ActivationResult;

// ============================================================================
// CONFIG
// ============================================================================

/// Hebbian learner parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HebbianConfig {
    /// Oja learning rate η
    pub learning_rate: f64,
    /// Lower weight clamp
    pub min_weight: f64,
    /// Upper weight clamp
    pub max_weight: f64,
    /// Only results at or above this activation form pairs
    pub activation_threshold: f64,
    /// Co-activations required before an edge is created
    pub creation_gate: u32,
    /// Sliding window the gate counts within
    #[serde(with = "window_days")]
    pub creation_window: chrono::Duration,
}

impl Default for HebbianConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            min_weight: MIN_EDGE_WEIGHT,
            max_weight: MAX_EDGE_WEIGHT,
            activation_threshold: 0.3,
            creation_gate: 3,
            creation_window: chrono::Duration::days(7),
        }
    }
}

mod window_days {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &chrono::Duration, s: S) -> Result<S::Ok, S::Error> {
        d.num_days().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<chrono::Duration, D::Error> {
        Ok(chrono::Duration::days(i64::deserialize(d)?))
    }
}

/// An unordered co-activation pair in canonical id order (`a < b`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoActivationPair {
    /// Smaller endpoint id
    pub a: String,
    /// Larger endpoint id
    pub b: String,
    /// Final activation of `a`
    pub activation_a: f64,
    /// Final activation of `b`
    pub activation_b: f64,
}

// ============================================================================
// OJA UPDATE
// ============================================================================

/// One Oja step: `W ← clamp(W + η(A·B − B²·W))`.
///
/// Non-finite results collapse to `min_weight`; the result never exceeds
/// `max_weight` for any input.
pub fn oja_update(weight: f64, a: f64, b: f64, cfg: &HebbianConfig) -> f64 {
    let updated = weight + cfg.learning_rate * (a * b - b * b * weight);
    if !updated.is_finite() {
        return cfg.min_weight;
    }
    updated.clamp(cfg.min_weight, cfg.max_weight)
}

/// Unclamped Oja step, used to study fixed points in tests
pub fn oja_update_uncapped(weight: f64, a: f64, b: f64, learning_rate: f64) -> f64 {
    weight + learning_rate * (a * b - b * b * weight)
}

/// Extract co-activation pairs from session results.
///
/// Only results at or above the activation threshold participate. Pairs
/// where BOTH endpoints were seeds are excluded: two behaviors matching the
/// same context says nothing about their affinity.
pub fn extract_pairs(
    results: &[ActivationResult],
    seed_ids: &HashSet<String>,
    cfg: &HebbianConfig,
) -> Vec<CoActivationPair> {
    let active: Vec<&ActivationResult> = results
        .iter()
        .filter(|r| r.activation >= cfg.activation_threshold)
        .collect();

    let mut pairs = Vec::new();
    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let (x, y) = (active[i], active[j]);
            if seed_ids.contains(&x.id) && seed_ids.contains(&y.id) {
                continue;
            }
            let (a, b) = if x.id <= y.id { (x, y) } else { (y, x) };
            pairs.push(CoActivationPair {
                a: a.id.clone(),
                b: b.id.clone(),
                activation_a: a.activation,
                activation_b: b.activation,
            });
        }
    }
    pairs
}

// ============================================================================
// LEARNER
// ============================================================================

/// Applies Oja updates and gate-checked edge creation through the store
pub struct HebbianLearner {
    store: Arc<dyn GraphStore>,
    config: HebbianConfig,
}

impl HebbianLearner {
    /// Learner over a store
    pub fn new(store: Arc<dyn GraphStore>, config: HebbianConfig) -> Self {
        Self { store, config }
    }

    /// Learner configuration
    pub fn config(&self) -> &HebbianConfig {
        &self.config
    }

    /// Apply one session's pairs.
    ///
    /// Existing co-activated edges get an Oja weight update; missing edges
    /// become creation candidates when `create_edges` is set, initialized at
    /// the minimum weight and immediately Oja-stepped. Everything lands in
    /// one store transaction, counters included. A failure looking up a
    /// single pair skips that pair; a transaction failure fails the batch.
    pub fn apply(
        &self,
        cancel: &CancellationToken,
        pairs: &[CoActivationPair],
        create_edges: bool,
    ) -> Result<HebbianReport> {
        let mut updates: Vec<EdgeWeightUpdate> = Vec::new();
        let mut candidates: Vec<CoActivationCandidate> = Vec::new();

        for pair in pairs {
            let existing =
                match self
                    .store
                    .get_edge(cancel, &pair.a, &pair.b, EdgeKind::CoActivated)
                {
                    Ok(edge) => edge,
                    Err(crate::store::StoreError::Cancelled) => {
                        return Err(crate::store::StoreError::Cancelled)
                    }
                    Err(e) => {
                        tracing::warn!(
                            a = %pair.a,
                            b = %pair.b,
                            error = %e,
                            "skipping pair after edge lookup failure"
                        );
                        continue;
                    }
                };

            match existing {
                Some(edge) => {
                    updates.push(EdgeWeightUpdate {
                        source: pair.a.clone(),
                        target: pair.b.clone(),
                        kind: EdgeKind::CoActivated,
                        weight: oja_update(
                            edge.weight,
                            pair.activation_a,
                            pair.activation_b,
                            &self.config,
                        ),
                    });
                }
                None if create_edges => {
                    candidates.push(CoActivationCandidate {
                        source: pair.a.clone(),
                        target: pair.b.clone(),
                        initial_weight: oja_update(
                            self.config.min_weight,
                            pair.activation_a,
                            pair.activation_b,
                            &self.config,
                        ),
                    });
                }
                None => {}
            }
        }

        let report = self.store.apply_hebbian_batch(
            cancel,
            &updates,
            &candidates,
            self.config.creation_gate,
            self.config.creation_window,
        )?;

        if !report.created.is_empty() {
            tracing::debug!(
                updated = report.updated,
                created = report.created.len(),
                pending = report.pending,
                "hebbian batch applied"
            );
        }
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
