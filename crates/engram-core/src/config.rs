//! Engine configuration
//!
//! One aggregate of every component's tunables, all defaulting to the
//! constants the engine was calibrated with. Thresholds and registries live
//! here (or on their owning component) rather than scattered through the
//! code; embedders construct the struct and hand it to the composition
//! root — there is no config-file loading in the core.

use crate::activation::{ActivationConfig, HebbianConfig, TieringConfig};
use crate::backup::BackupConfig;
use crate::learning::LearningConfig;
use crate::similarity::SimilarityConfig;

/// Aggregate engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngramConfig {
    /// Learning loop thresholds and scope policy
    pub learning: LearningConfig,
    /// Spreading engine parameters
    pub activation: ActivationConfig,
    /// Hebbian learner parameters
    pub hebbian: HebbianConfig,
    /// Tier thresholds and token costs
    pub tiering: TieringConfig,
    /// Similarity composite parameters
    pub similarity: SimilarityConfig,
    /// Backup path policy
    pub backup: BackupConfig,
}
