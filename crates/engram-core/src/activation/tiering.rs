//! Tiering and token budget planning
//!
//! Maps activated behaviors onto injection tiers (full, summary, name-only)
//! and packs them into a token budget. Constraints are protected: they may
//! be demoted to summary to fit, never further, even when that crowds out
//! non-constraints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Behavior, BehaviorKind};

use super::spreading::ActivationResult;

// ============================================================================
// TIERS
// ============================================================================

/// Injection tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Full canonical (or expanded) wording
    Full,
    /// Short summary wording
    Summary,
    /// Name only
    NameOnly,
    /// Not injected this turn
    Omitted,
}

impl Tier {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Full => "full",
            Tier::Summary => "summary",
            Tier::NameOnly => "name-only",
            Tier::Omitted => "omitted",
        }
    }
}

/// Tiering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieringConfig {
    /// Activation at or above which a behavior renders full
    pub full_threshold: f64,
    /// Activation at or above which a behavior renders as a summary
    pub summary_threshold: f64,
    /// Token cost of a full rendering
    pub full_cost: usize,
    /// Token cost of a summary rendering
    pub summary_cost: usize,
    /// Token cost of a name-only rendering
    pub name_only_cost: usize,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            full_threshold: 0.7,
            summary_threshold: 0.4,
            full_cost: 80,
            summary_cost: 30,
            name_only_cost: 10,
        }
    }
}

impl TieringConfig {
    /// Tier a behavior earns from activation alone
    pub fn natural_tier(&self, activation: f64) -> Tier {
        if activation >= self.full_threshold {
            Tier::Full
        } else if activation >= self.summary_threshold {
            Tier::Summary
        } else {
            Tier::NameOnly
        }
    }

    /// Token cost of a tier
    pub fn cost(&self, tier: Tier) -> usize {
        match tier {
            Tier::Full => self.full_cost,
            Tier::Summary => self.summary_cost,
            Tier::NameOnly => self.name_only_cost,
            Tier::Omitted => 0,
        }
    }
}

/// One behavior's place in the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAssignment {
    /// Behavior id
    pub behavior_id: String,
    /// Final activation
    pub activation: f64,
    /// Assigned tier
    pub tier: Tier,
    /// Tokens charged
    pub tokens: usize,
}

/// A budgeted injection plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionPlan {
    /// Behaviors rendered in full
    pub full: Vec<TierAssignment>,
    /// Behaviors rendered as summaries
    pub summarized: Vec<TierAssignment>,
    /// Behaviors rendered name-only
    pub name_only: Vec<TierAssignment>,
    /// Behaviors left out this turn
    pub omitted: Vec<String>,
    /// Tokens charged in total; never exceeds the budget
    pub total_tokens: usize,
    /// The budget planned against
    pub budget: usize,
}

// ============================================================================
// PLANNER
// ============================================================================

/// Builds injection plans from session results
#[derive(Debug, Clone, Default)]
pub struct TieringPlanner {
    config: TieringConfig,
}

impl TieringPlanner {
    /// Planner with the given thresholds and costs
    pub fn new(config: TieringConfig) -> Self {
        Self { config }
    }

    /// Pack `results` into `budget` tokens.
    ///
    /// Constraints are placed first in activation order and never drop
    /// below summary; everything else follows greedily, demoting tier by
    /// tier until it fits or is omitted.
    pub fn map(
        &self,
        results: &[ActivationResult],
        behaviors: &HashMap<String, Behavior>,
        budget: usize,
    ) -> InjectionPlan {
        let cfg = &self.config;
        let mut plan = InjectionPlan {
            budget,
            ..Default::default()
        };

        let mut ordered: Vec<&ActivationResult> = results.iter().collect();
        ordered.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let is_constraint = |id: &str| {
            behaviors
                .get(id)
                .is_some_and(|b| b.kind == BehaviorKind::Constraint)
        };

        let mut remaining = budget;

        // Constraints first: full when affordable, else summary; never lower.
        for result in ordered.iter().filter(|r| is_constraint(&r.id)) {
            let natural = cfg.natural_tier(result.activation);
            let desired = if natural == Tier::Full {
                Tier::Full
            } else {
                Tier::Summary
            };
            let tier = if cfg.cost(desired) <= remaining {
                desired
            } else if cfg.cost(Tier::Summary) <= remaining {
                Tier::Summary
            } else {
                tracing::warn!(
                    behavior = %result.id,
                    budget,
                    "budget cannot hold constraint even at summary tier"
                );
                plan.omitted.push(result.id.clone());
                continue;
            };
            remaining -= cfg.cost(tier);
            push_assignment(&mut plan, result, tier, cfg);
        }

        // Everyone else greedily, demoting until something fits.
        for result in ordered.iter().filter(|r| !is_constraint(&r.id)) {
            let mut tier = cfg.natural_tier(result.activation);
            let tier = loop {
                if cfg.cost(tier) <= remaining {
                    break Some(tier);
                }
                tier = match tier {
                    Tier::Full => Tier::Summary,
                    Tier::Summary => Tier::NameOnly,
                    Tier::NameOnly | Tier::Omitted => break None,
                };
            };
            match tier {
                Some(tier) => {
                    remaining -= cfg.cost(tier);
                    push_assignment(&mut plan, result, tier, cfg);
                }
                None => plan.omitted.push(result.id.clone()),
            }
        }

        plan.total_tokens = budget - remaining;
        plan
    }
}

fn push_assignment(
    plan: &mut InjectionPlan,
    result: &ActivationResult,
    tier: Tier,
    cfg: &TieringConfig,
) {
    let assignment = TierAssignment {
        behavior_id: result.id.clone(),
        activation: result.activation,
        tier,
        tokens: cfg.cost(tier),
    };
    match tier {
        Tier::Full => plan.full.push(assignment),
        Tier::Summary => plan.summarized.push(assignment),
        Tier::NameOnly => plan.name_only.push(assignment),
        Tier::Omitted => {}
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, activation: f64) -> ActivationResult {
        ActivationResult {
            id: id.to_string(),
            activation,
            distance: 0,
            source: String::new(),
        }
    }

    fn behaviors(entries: &[(&str, BehaviorKind)]) -> HashMap<String, Behavior> {
        entries
            .iter()
            .map(|(id, kind)| {
                let mut b = Behavior::new(id.to_string(), "learned/rule", "rule text");
                b.kind = *kind;
                (id.to_string(), b)
            })
            .collect()
    }

    #[test]
    fn test_natural_tiers() {
        let cfg = TieringConfig::default();
        assert_eq!(cfg.natural_tier(0.9), Tier::Full);
        assert_eq!(cfg.natural_tier(0.7), Tier::Full);
        assert_eq!(cfg.natural_tier(0.5), Tier::Summary);
        assert_eq!(cfg.natural_tier(0.4), Tier::Summary);
        assert_eq!(cfg.natural_tier(0.2), Tier::NameOnly);
    }

    #[test]
    fn test_everything_fits_in_large_budget() {
        let planner = TieringPlanner::default();
        let results = vec![
            result("behavior-a", 0.9),
            result("behavior-b", 0.5),
            result("behavior-c", 0.2),
        ];
        let plan = planner.map(&results, &behaviors(&[]), 1000);
        assert_eq!(plan.full.len(), 1);
        assert_eq!(plan.summarized.len(), 1);
        assert_eq!(plan.name_only.len(), 1);
        assert!(plan.omitted.is_empty());
        assert_eq!(plan.total_tokens, 80 + 30 + 10);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let planner = TieringPlanner::default();
        let results: Vec<ActivationResult> = (0..20)
            .map(|i| result(&format!("behavior-{:02}", i), 0.9 - 0.01 * i as f64))
            .collect();
        for budget in [0, 10, 35, 100, 250, 400] {
            let plan = planner.map(&results, &behaviors(&[]), budget);
            assert!(plan.total_tokens <= budget, "budget {budget} exceeded");
        }
    }

    #[test]
    fn test_demotion_when_tight() {
        let planner = TieringPlanner::default();
        let results = vec![result("behavior-a", 0.9), result("behavior-b", 0.9)];
        // 100 tokens: first full (80), second demotes past summary (30 > 20)
        // to name-only (10)
        let plan = planner.map(&results, &behaviors(&[]), 100);
        assert_eq!(plan.full.len(), 1);
        assert_eq!(plan.name_only.len(), 1);
        assert_eq!(plan.total_tokens, 90);
    }

    #[test]
    fn test_constraint_never_below_summary() {
        let planner = TieringPlanner::default();
        let kinds = behaviors(&[
            ("behavior-constraint", BehaviorKind::Constraint),
            ("behavior-a", BehaviorKind::Directive),
            ("behavior-b", BehaviorKind::Directive),
        ]);
        // Constraint has the LOWEST activation, but still takes a summary
        // slot before the directives fill the budget.
        let results = vec![
            result("behavior-a", 0.9),
            result("behavior-b", 0.8),
            result("behavior-constraint", 0.2),
        ];
        let plan = planner.map(&results, &kinds, 120);

        let constraint = plan
            .summarized
            .iter()
            .find(|t| t.behavior_id == "behavior-constraint");
        assert!(constraint.is_some(), "constraint must hold a summary slot");
        assert!(plan
            .name_only
            .iter()
            .all(|t| t.behavior_id != "behavior-constraint"));
        assert!(plan.total_tokens <= 120);

        // One directive was forced down to make room: 30 (constraint) + 80
        // (first directive) leaves 10, name-only for the second.
        assert_eq!(plan.full.len(), 1);
        assert_eq!(plan.name_only.len(), 1);
    }

    #[test]
    fn test_constraint_demotes_from_full_to_summary_only() {
        let planner = TieringPlanner::default();
        let kinds = behaviors(&[("behavior-constraint", BehaviorKind::Constraint)]);
        let results = vec![result("behavior-constraint", 0.95)];
        // Budget holds a summary but not a full rendering
        let plan = planner.map(&results, &kinds, 40);
        assert_eq!(plan.summarized.len(), 1);
        assert!(plan.full.is_empty());
        assert_eq!(plan.total_tokens, 30);
    }

    #[test]
    fn test_infeasible_constraint_budget_omits() {
        let planner = TieringPlanner::default();
        let kinds = behaviors(&[("behavior-constraint", BehaviorKind::Constraint)]);
        let results = vec![result("behavior-constraint", 0.95)];
        let plan = planner.map(&results, &kinds, 20);
        assert_eq!(plan.omitted, vec!["behavior-constraint".to_string()]);
        assert_eq!(plan.total_tokens, 0);
    }
}
