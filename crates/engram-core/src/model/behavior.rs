//! Behavior - the fundamental unit of the rule graph
//!
//! A behavior is a durable agent rule (directive, constraint, preference or
//! procedure) with an applicability predicate, provenance, and activation
//! statistics. Behavior ids are content-addressed over the correction pair
//! that produced them, so the same mistake corrected the same way always
//! maps to the same node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::sanitize::{sanitize_name, MAX_NAME_LEN};
use super::tagger::MAX_TAGS;
use super::when::{keys, WhenPredicate};

/// Prefix of every behavior id
pub const BEHAVIOR_ID_PREFIX: &str = "behavior-";

/// Name prefix for behaviors produced by the learning loop
pub const LEARNED_NAME_PREFIX: &str = "learned/";

/// Hex digits kept from the content digest
const ID_DIGEST_LEN: usize = 16;

// ============================================================================
// KINDS
// ============================================================================

/// Kind of behavior, including terminal curation states.
///
/// Curated kinds (forgotten, deprecated, merged) are soft deletions: the
/// node stays in the graph for provenance but is never seeded or injected.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    /// A plain instruction to follow
    #[default]
    Directive,
    /// A hard rule; violations are serious
    Constraint,
    /// A softer "do X rather than Y"
    Preference,
    /// Ordered steps to follow
    Procedure,
    /// Curation: explicitly forgotten
    Forgotten,
    /// Curation: no longer applicable
    Deprecated,
    /// Curation: absorbed into another behavior
    Merged,
}

impl BehaviorKind {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Directive => "directive",
            BehaviorKind::Constraint => "constraint",
            BehaviorKind::Preference => "preference",
            BehaviorKind::Procedure => "procedure",
            BehaviorKind::Forgotten => "forgotten",
            BehaviorKind::Deprecated => "deprecated",
            BehaviorKind::Merged => "merged",
        }
    }

    /// Parse from string name; unknown names fall back to directive
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "directive" => BehaviorKind::Directive,
            "constraint" => BehaviorKind::Constraint,
            "preference" => BehaviorKind::Preference,
            "procedure" => BehaviorKind::Procedure,
            "forgotten" => BehaviorKind::Forgotten,
            "deprecated" => BehaviorKind::Deprecated,
            "merged" => BehaviorKind::Merged,
            _ => BehaviorKind::Directive,
        }
    }

    /// True for terminal curation states
    pub fn is_curated(&self) -> bool {
        matches!(
            self,
            BehaviorKind::Forgotten | BehaviorKind::Deprecated | BehaviorKind::Merged
        )
    }
}

impl std::fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a behavior came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Inserted by a human
    #[default]
    Manual,
    /// Produced by the correction learning loop
    Learned,
    /// Result of merging duplicates
    Merged,
}

impl SourceType {
    /// String representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::Learned => "learned",
            SourceType::Merged => "merged",
        }
    }

    /// Parse from string name; unknown names fall back to manual
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "learned" => SourceType::Learned,
            "merged" => SourceType::Merged,
            _ => SourceType::Manual,
        }
    }
}

/// Scope classification: local behaviors are tied to a file-path pattern,
/// global behaviors apply project-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorScope {
    /// Scoped to a file-path pattern
    Local,
    /// Applies everywhere the rest of the predicate allows
    Global,
}

impl std::str::FromStr for BehaviorScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BehaviorScope::Local),
            "global" => Ok(BehaviorScope::Global),
            _ => Err(format!("Unknown scope: {}", s)),
        }
    }
}

impl std::fmt::Display for BehaviorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BehaviorScope::Local => write!(f, "local"),
            BehaviorScope::Global => write!(f, "global"),
        }
    }
}

// ============================================================================
// CONTENT
// ============================================================================

/// Structured avoid/prefer sub-content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredContent {
    /// What the agent should avoid doing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avoid: Option<String>,
    /// What the agent should do instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer: Option<String>,
}

/// Renderable content of a behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorContent {
    /// Canonical wording; never empty on a valid behavior
    pub canonical: String,
    /// Longer wording for full-tier injection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<String>,
    /// Short wording for summary-tier injection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Structured avoid/prefer pair
    #[serde(default)]
    pub structured: StructuredContent,
    /// Canonical tags, sorted ascending, deduplicated, at most 8
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BehaviorContent {
    /// Content with just a canonical wording
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            ..Default::default()
        }
    }

    /// Replace tags, enforcing the sorted/deduplicated/capped invariant
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = tags.into_iter().map(Into::into).collect();
        collected.sort();
        collected.dedup();
        collected.truncate(MAX_TAGS);
        self.tags = collected;
    }

    /// Re-establish the tag invariant on content loaded from outside
    pub fn normalize(&mut self) {
        let tags = std::mem::take(&mut self.tags);
        self.set_tags(tags);
    }
}

// ============================================================================
// PROVENANCE AND STATS
// ============================================================================

/// Origin record of a behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// How the behavior entered the graph
    pub source_type: SourceType,
    /// Creation time of the originating record
    pub created_at: DateTime<Utc>,
    /// Human author for manual behaviors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Correction that produced a learned behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_id: Option<String>,
    /// Reviewer who approved a pending behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Reviewer who rejected a pending behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// Free-text note from review
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            source_type: SourceType::Manual,
            created_at: Utc::now(),
            author: None,
            correction_id: None,
            approved_by: None,
            rejected_by: None,
            review_note: None,
        }
    }
}

impl Provenance {
    /// Provenance for a learned behavior
    pub fn learned(correction_id: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Learned,
            correction_id: Some(correction_id.into()),
            ..Default::default()
        }
    }
}

/// Activation and confirmation counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorStats {
    /// Times surfaced by the activation engine
    pub times_activated: i64,
    /// Times the agent demonstrably followed the rule
    pub times_followed: i64,
    /// Times a human confirmed the rule
    pub times_confirmed: i64,
    /// Times a human overrode the rule
    pub times_overridden: i64,
    /// Node creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Last time surfaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activated: Option<DateTime<Utc>>,
    /// Last human confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_confirmed: Option<DateTime<Utc>>,
}

impl Default for BehaviorStats {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            times_activated: 0,
            times_followed: 0,
            times_confirmed: 0,
            times_overridden: 0,
            created_at: now,
            updated_at: now,
            last_activated: None,
            last_confirmed: None,
        }
    }
}

// ============================================================================
// BEHAVIOR
// ============================================================================

/// A behavior node in the rule graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    /// Content-addressed id, `behavior-` prefixed
    pub id: String,
    /// Sanitized slug name, `learned/` prefixed for learned behaviors
    pub name: String,
    /// Kind or curation state
    pub kind: BehaviorKind,
    /// Applicability predicate; empty means always a candidate
    #[serde(default)]
    pub when: WhenPredicate,
    /// Renderable content
    pub content: BehaviorContent,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Manual ordering hint; higher wins ties in rendering
    pub priority: i64,
    /// Origin record
    pub provenance: Provenance,
    /// Activation statistics
    pub stats: BehaviorStats,
}

impl Behavior {
    /// Content-addressed behavior id over the correction pair.
    ///
    /// Context never participates: the same (agent_action, corrected_action)
    /// always yields the same id.
    pub fn id_for(agent_action: &str, corrected_action: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(agent_action.as_bytes());
        hasher.update([0x1f]);
        hasher.update(corrected_action.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(ID_DIGEST_LEN)
            .collect();
        format!("{}{}", BEHAVIOR_ID_PREFIX, hex)
    }

    /// New manual behavior with defaults
    pub fn new(id: impl Into<String>, name: &str, canonical: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: sanitize_name(name),
            kind: BehaviorKind::default(),
            when: WhenPredicate::new(),
            content: BehaviorContent::new(canonical),
            confidence: 1.0,
            priority: 0,
            provenance: Provenance::default(),
            stats: BehaviorStats::default(),
        }
    }

    /// Clamp confidence into [0, 1]; non-finite values become 0
    pub fn clamp_confidence(&mut self) {
        if !self.confidence.is_finite() {
            self.confidence = 0.0;
        } else {
            self.confidence = self.confidence.clamp(0.0, 1.0);
        }
    }

    /// Scope classification from the `when` predicate
    pub fn scope(&self) -> BehaviorScope {
        if self.when.contains_key(keys::FILE_PATH) {
            BehaviorScope::Local
        } else {
            BehaviorScope::Global
        }
    }

    /// True when the behavior may be seeded and injected
    pub fn is_active(&self) -> bool {
        !self.kind.is_curated()
    }

    /// Validate the node invariants; returns the first violation
    pub fn validate(&self) -> Result<(), String> {
        if !self.id.starts_with(BEHAVIOR_ID_PREFIX) {
            return Err(format!("behavior id missing prefix: {}", self.id));
        }
        if self.content.canonical.trim().is_empty() {
            return Err("canonical content is empty".to_string());
        }
        if self.name.is_empty() || self.name.chars().count() > MAX_NAME_LEN {
            return Err(format!("invalid name: {:?}", self.name));
        }
        if sanitize_name(&self.name) != self.name {
            return Err(format!("name not sanitized: {:?}", self.name));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence out of range: {}", self.confidence));
        }
        let mut sorted = self.content.tags.clone();
        sorted.sort();
        sorted.dedup();
        if sorted != self.content.tags || self.content.tags.len() > MAX_TAGS {
            return Err("tags not sorted/deduplicated/capped".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
