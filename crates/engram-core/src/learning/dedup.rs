//! Deduplication
//!
//! Pluggable duplicate detection and merging. The rule-based implementation
//! scores candidates against when-overlapping behaviors with the similarity
//! composite; store-wide scans cluster duplicates with union-find and fold
//! each cluster into its primary, redirecting edges.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::{Behavior, BehaviorKind, SourceType};
use crate::similarity::SimilarityScorer;
use crate::store::{BehaviorFilter, GraphStore};

use super::LearningError;

/// Similarity at which two behaviors count as duplicates for reporting
pub const DUPLICATE_THRESHOLD: f64 = 0.7;

/// Pairwise score cache size for store-wide scans
const SCAN_CACHE_SIZE: usize = 4096;

/// A detected duplicate of a candidate behavior
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    /// Existing behavior id
    pub behavior_id: String,
    /// Composite similarity against the candidate
    pub similarity: f64,
}

/// Outcome of a store-wide deduplication pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupReport {
    /// Behaviors examined
    pub scanned: usize,
    /// Duplicate clusters found
    pub clusters: usize,
    /// Behaviors folded into a primary
    pub merged: usize,
}

/// Duplicate-handling capability consumed by the learning loop
pub trait Deduplicator: Send + Sync {
    /// Existing behaviors duplicating `candidate`, best first
    fn find_duplicates(
        &self,
        cancel: &CancellationToken,
        candidate: &Behavior,
    ) -> Result<Vec<DuplicateMatch>, LearningError>;

    /// Fold `candidate` into the best of `matches`. The existing behavior
    /// survives (absorbing tags and a confirmation); the candidate is never
    /// persisted. Returns the surviving id.
    fn merge_duplicates(
        &self,
        cancel: &CancellationToken,
        matches: &[DuplicateMatch],
        candidate: &Behavior,
    ) -> Result<String, LearningError>;

    /// Scan the whole store, merging every duplicate cluster
    fn deduplicate_store(&self, cancel: &CancellationToken) -> Result<DedupReport, LearningError>;
}

// ============================================================================
// RULE-BASED IMPLEMENTATION
// ============================================================================

/// Union-find over behavior indices for duplicate clustering
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        if self.rank[rx] < self.rank[ry] {
            self.parent[rx] = ry;
        } else if self.rank[rx] > self.rank[ry] {
            self.parent[ry] = rx;
        } else {
            self.parent[ry] = rx;
            self.rank[rx] += 1;
        }
    }
}

/// Similarity-composite deduplicator
pub struct RuleBasedDeduplicator {
    store: Arc<dyn GraphStore>,
    scorer: SimilarityScorer,
    threshold: f64,
}

impl RuleBasedDeduplicator {
    /// Deduplicator reporting matches at [`DUPLICATE_THRESHOLD`]
    pub fn new(store: Arc<dyn GraphStore>, scorer: SimilarityScorer) -> Self {
        Self::with_threshold(store, scorer, DUPLICATE_THRESHOLD)
    }

    /// Deduplicator with a custom reporting threshold
    pub fn with_threshold(
        store: Arc<dyn GraphStore>,
        scorer: SimilarityScorer,
        threshold: f64,
    ) -> Self {
        Self {
            store,
            scorer,
            threshold,
        }
    }

    /// Fold `secondary` (already stored) into `primary`: tags union into
    /// the primary, edges redirect, the secondary is marked merged.
    fn fold_stored(
        &self,
        cancel: &CancellationToken,
        primary: &mut Behavior,
        secondary: &Behavior,
    ) -> Result<(), LearningError> {
        let mut tags = primary.content.tags.clone();
        tags.extend(secondary.content.tags.iter().cloned());
        primary.content.set_tags(tags);
        primary.confidence = primary.confidence.max(secondary.confidence);
        primary.stats.times_confirmed += 1;
        primary.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, primary)?;

        self.store.redirect_edges(cancel, &secondary.id, &primary.id)?;

        let mut merged = secondary.clone();
        merged.kind = BehaviorKind::Merged;
        merged.provenance.source_type = SourceType::Merged;
        merged.provenance.review_note = Some(format!("merged into {}", primary.id));
        merged.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, &merged)?;
        Ok(())
    }
}

impl Deduplicator for RuleBasedDeduplicator {
    fn find_duplicates(
        &self,
        cancel: &CancellationToken,
        candidate: &Behavior,
    ) -> Result<Vec<DuplicateMatch>, LearningError> {
        let neighbors = self.store.query_behaviors(
            cancel,
            &BehaviorFilter::active().overlapping(candidate.when.clone()),
        )?;

        let mut matches: Vec<DuplicateMatch> = neighbors
            .iter()
            .filter(|n| n.id != candidate.id)
            .filter_map(|n| {
                let similarity = self.scorer.score(candidate, n);
                (similarity >= self.threshold).then(|| DuplicateMatch {
                    behavior_id: n.id.clone(),
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.behavior_id.cmp(&b.behavior_id))
        });
        Ok(matches)
    }

    fn merge_duplicates(
        &self,
        cancel: &CancellationToken,
        matches: &[DuplicateMatch],
        candidate: &Behavior,
    ) -> Result<String, LearningError> {
        let best = matches.first().ok_or_else(|| {
            LearningError::Extraction("merge requested with no duplicate matches".to_string())
        })?;
        let mut primary = self
            .store
            .get_behavior(cancel, &best.behavior_id)?
            .ok_or_else(|| {
                LearningError::Extraction(format!("merge target vanished: {}", best.behavior_id))
            })?;

        let mut tags = primary.content.tags.clone();
        tags.extend(candidate.content.tags.iter().cloned());
        primary.content.set_tags(tags);
        primary.confidence = primary.confidence.max(candidate.confidence);
        primary.stats.times_confirmed += 1;
        primary.stats.updated_at = chrono::Utc::now();
        self.store.update_behavior(cancel, &primary)?;

        tracing::info!(
            candidate = %candidate.id,
            primary = %primary.id,
            similarity = best.similarity,
            "candidate merged into existing behavior"
        );
        Ok(primary.id.clone())
    }

    fn deduplicate_store(&self, cancel: &CancellationToken) -> Result<DedupReport, LearningError> {
        let behaviors = self
            .store
            .query_behaviors(cancel, &BehaviorFilter::active())?;
        let n = behaviors.len();
        let mut report = DedupReport {
            scanned: n,
            ..Default::default()
        };
        if n < 2 {
            return Ok(report);
        }

        // SAFETY: SCAN_CACHE_SIZE is a non-zero constant
        let mut cache = LruCache::<(String, String), f64>::new(
            NonZeroUsize::new(SCAN_CACHE_SIZE).expect("cache size is non-zero"),
        );
        let mut uf = UnionFind::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if !behaviors[i].when.overlaps(&behaviors[j].when) {
                    continue;
                }
                let key = (behaviors[i].id.clone(), behaviors[j].id.clone());
                let score = match cache.get(&key) {
                    Some(s) => *s,
                    None => {
                        let s = self.scorer.score(&behaviors[i], &behaviors[j]);
                        cache.put(key, s);
                        s
                    }
                };
                if score >= self.threshold {
                    uf.union(i, j);
                }
            }
        }

        let mut clusters: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();
        for i in 0..n {
            clusters.entry(uf.find(i)).or_default().push(i);
        }

        for members in clusters.values() {
            if members.len() < 2 {
                continue;
            }
            report.clusters += 1;

            // Primary: highest confidence, then earliest creation
            let Some(&primary_idx) = members.iter().max_by(|&&a, &&b| {
                behaviors[a]
                    .confidence
                    .partial_cmp(&behaviors[b].confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        behaviors[b]
                            .stats
                            .created_at
                            .cmp(&behaviors[a].stats.created_at)
                    })
            }) else {
                continue;
            };

            let mut primary = behaviors[primary_idx].clone();
            for &idx in members {
                if idx == primary_idx {
                    continue;
                }
                self.fold_stored(cancel, &mut primary, &behaviors[idx])?;
                report.merged += 1;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            clusters = report.clusters,
            merged = report.merged,
            "store deduplication pass finished"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
