//! Spreading activation engine
//!
//! Propagates seed energy through the weighted behavior graph for a fixed
//! number of synchronous steps, squashes the raw accumulation through one
//! sigmoid, then applies lateral inhibition so a bounded set of winners
//! emerges. All state is per-call; the engine reads the graph and never
//! writes it.
//!
//! Numeric choices that keep the dynamics stable over thousands of
//! sessions: synchronous updates (results cannot depend on map iteration
//! order), max-not-sum accumulation (no cascading inflation around cycles),
//! a single sigmoid applied once after propagation, and temporal decay on
//! the *effective* edge weight only (stored weights stay recoverable).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::EdgeKind;
use crate::store::{Direction, GraphStore, Result};

use super::seeds::Seed;

/// Sigmoid steepness
const SIGMOID_GAIN: f64 = 10.0;

/// Sigmoid midpoint
const SIGMOID_MIDPOINT: f64 = 0.3;

// ============================================================================
// CONFIG
// ============================================================================

/// Lateral inhibition parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InhibitionConfig {
    /// Whether inhibition runs at all
    pub enabled: bool,
    /// Fraction of the winner-loser gap subtracted from each loser
    pub strength: f64,
    /// Number of winners left untouched
    pub breadth: usize,
}

impl Default for InhibitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.15,
            breadth: 7,
        }
    }
}

/// Spreading engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationConfig {
    /// Propagation steps per session
    pub max_steps: u32,
    /// Per-step energy decay
    pub decay_factor: f64,
    /// Fraction of a node's activation available to spread
    pub spread_factor: f64,
    /// Activations below this are dropped from results (and do not spread)
    pub min_activation: f64,
    /// Temporal decay rate per hour of edge dormancy
    pub temporal_decay_rate: f64,
    /// Lateral inhibition parameters
    pub inhibition: InhibitionConfig,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            decay_factor: 0.5,
            spread_factor: 0.8,
            min_activation: 0.01,
            temporal_decay_rate: 0.01,
            inhibition: InhibitionConfig::default(),
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One activated behavior after a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResult {
    /// Behavior id
    pub id: String,
    /// Final activation in [0, 1]
    pub activation: f64,
    /// Hops from the nearest seed
    pub distance: u32,
    /// Origin label inherited from the closest seed
    pub source: String,
}

/// Per-step debug snapshot; each snapshot owns an independent copy of the
/// activation map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    /// Step index, or the last propagation step for the final snapshot
    pub step: u32,
    /// True for the post-sigmoid, post-inhibition snapshot
    pub r#final: bool,
    /// Activation per node
    pub activation: BTreeMap<String, f64>,
}

/// The sigmoid used for squashing: `1 / (1 + e^{-10(x - 0.3)})`
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-SIGMOID_GAIN * (x - SIGMOID_MIDPOINT)).exp())
}

// ============================================================================
// ENGINE
// ============================================================================

/// The spreading activation engine
pub struct SpreadingEngine {
    store: Arc<dyn GraphStore>,
    config: ActivationConfig,
}

impl SpreadingEngine {
    /// Engine over a store
    pub fn new(store: Arc<dyn GraphStore>, config: ActivationConfig) -> Self {
        Self { store, config }
    }

    /// Engine configuration
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Run one activation session from the given seeds.
    pub fn activate(
        &self,
        cancel: &CancellationToken,
        seeds: &[Seed],
    ) -> Result<Vec<ActivationResult>> {
        let (results, _) = self.run(cancel, seeds, false)?;
        Ok(results)
    }

    /// Like [`SpreadingEngine::activate`], but also returns a snapshot after
    /// every propagation step plus a final snapshot flagged `final`.
    pub fn activate_with_steps(
        &self,
        cancel: &CancellationToken,
        seeds: &[Seed],
    ) -> Result<(Vec<ActivationResult>, Vec<StepSnapshot>)> {
        self.run(cancel, seeds, true)
    }

    fn run(
        &self,
        cancel: &CancellationToken,
        seeds: &[Seed],
        keep_steps: bool,
    ) -> Result<(Vec<ActivationResult>, Vec<StepSnapshot>)> {
        let now = Utc::now();
        let cfg = &self.config;

        // BTreeMaps keep every traversal deterministic regardless of seed
        // input order.
        let mut activation: BTreeMap<String, f64> = BTreeMap::new();
        let mut distance: BTreeMap<String, u32> = BTreeMap::new();
        let mut source: BTreeMap<String, String> = BTreeMap::new();

        for seed in seeds {
            let entry = activation.entry(seed.id.clone()).or_insert(0.0);
            if seed.activation > *entry {
                *entry = seed.activation;
                source.insert(seed.id.clone(), seed.source.clone());
            }
            distance.insert(seed.id.clone(), 0);
        }

        let mut snapshots = Vec::new();

        for step in 0..cfg.max_steps {
            if cancel.is_cancelled() {
                return Err(crate::store::StoreError::Cancelled);
            }

            // Synchronous update: read the step-start state, write into a
            // snapshot copy.
            let mut next = activation.clone();
            let mut next_distance = distance.clone();
            let mut next_source = source.clone();

            for (node, &level) in &activation {
                if level < cfg.min_activation {
                    continue;
                }
                let edges = self.store.get_edges(cancel, node, Direction::Both, None)?;
                let out_degree = edges.len();
                if out_degree == 0 {
                    continue;
                }

                for edge in &edges {
                    let Some(neighbor) = edge.neighbor_of(node) else {
                        continue;
                    };
                    let effective = edge.effective_weight(now, cfg.temporal_decay_rate);
                    let energy = level * cfg.spread_factor * effective / out_degree as f64
                        * cfg.decay_factor;

                    if edge.kind == EdgeKind::Conflicts {
                        // Suppression applies to nodes already carrying
                        // energy; it never introduces a node by itself.
                        if let Some(existing) = next.get_mut(neighbor) {
                            *existing = (*existing - energy).max(0.0);
                        }
                        continue;
                    }

                    let entry = next.entry(neighbor.to_string()).or_insert(0.0);
                    // Max, not sum: parallel paths reinforce the strongest
                    // route instead of inflating each other.
                    if energy > *entry {
                        *entry = energy;
                    }

                    let through = distance.get(node).copied().unwrap_or(0) + 1;
                    let known = next_distance.get(neighbor).copied();
                    if known.is_none_or(|d| through < d) {
                        next_distance.insert(neighbor.to_string(), through);
                        if let Some(origin) = source.get(node) {
                            next_source.insert(neighbor.to_string(), origin.clone());
                        }
                    }
                }
            }

            activation = next;
            distance = next_distance;
            source = next_source;

            if keep_steps {
                snapshots.push(StepSnapshot {
                    step,
                    r#final: false,
                    activation: activation.clone(),
                });
            }
        }

        // One sigmoid, after propagation and before inhibition.
        for value in activation.values_mut() {
            *value = sigmoid(*value);
        }

        if cfg.inhibition.enabled && activation.len() > cfg.inhibition.breadth {
            apply_inhibition(&mut activation, &cfg.inhibition);
        }

        if keep_steps {
            snapshots.push(StepSnapshot {
                step: cfg.max_steps.saturating_sub(1),
                r#final: true,
                activation: activation.clone(),
            });
        }

        let mut results: Vec<ActivationResult> = activation
            .into_iter()
            .filter(|(_, a)| *a >= cfg.min_activation)
            .map(|(id, a)| ActivationResult {
                distance: distance.get(&id).copied().unwrap_or(0),
                source: source.get(&id).cloned().unwrap_or_default(),
                id,
                activation: a,
            })
            .collect();
        results.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        tracing::debug!(
            seeds = seeds.len(),
            activated = results.len(),
            "activation session finished"
        );
        Ok((results, snapshots))
    }
}

/// Top-breadth winners keep their activation; every loser moves toward zero
/// by `strength` times its gap to the mean winner.
fn apply_inhibition(activation: &mut BTreeMap<String, f64>, cfg: &InhibitionConfig) {
    let mut ranked: Vec<(String, f64)> = activation
        .iter()
        .map(|(id, a)| (id.clone(), *a))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let winners = &ranked[..cfg.breadth];
    let mean_winner = winners.iter().map(|(_, a)| a).sum::<f64>() / cfg.breadth as f64;

    for (id, level) in ranked.iter().skip(cfg.breadth) {
        let suppressed = (level - cfg.strength * (mean_winner - level)).max(0.0);
        activation.insert(id.clone(), suppressed);
    }
}

// ============================================================================
// TESTS
// ============================================================================
