//! Activation engine - surfacing behaviors at turn time
//!
//! Context snapshot → seeds → spreading activation → sigmoid → lateral
//! inhibition → results, with Hebbian co-activation learning and token
//! budget planning layered on top by the pipeline facade.

mod hebbian;
mod pipeline;
mod seeds;
mod spreading;
mod tiering;

pub use hebbian::{
    extract_pairs, oja_update, oja_update_uncapped, CoActivationPair, HebbianConfig,
    HebbianLearner,
};
pub use pipeline::{Pipeline, SessionOptions, SessionOutcome};
pub use seeds::{activation_for_specificity, Seed, SeedSelector};
pub use spreading::{
    sigmoid, ActivationConfig, ActivationResult, InhibitionConfig, SpreadingEngine, StepSnapshot,
};
pub use tiering::{InjectionPlan, Tier, TierAssignment, TieringConfig, TieringPlanner};
