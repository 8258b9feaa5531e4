//! Correction → behavior extraction
//!
//! Turns a raw correction into a candidate behavior: infers the kind from
//! signal phrases, derives a `when` predicate from the context snapshot,
//! assembles sanitized content, and names the result.

use std::collections::BTreeSet;

use crate::model::sanitize::{sanitize_content, slugify};
use crate::model::{
    keys, Behavior, BehaviorContent, BehaviorKind, Correction, Provenance, StructuredContent,
    Tagger, WhenPredicate, WhenValue, LEARNED_NAME_PREFIX,
};

use super::LearningError;

/// Confidence assigned to freshly learned behaviors
pub const DEFAULT_LEARNED_CONFIDENCE: f64 = 0.6;

/// Characters of canonical text that feed the slug name
const NAME_SOURCE_CAP: usize = 50;

/// Phrases that mark a hard rule
const CONSTRAINT_SIGNALS: &[&str] = &[
    "never",
    "don't",
    "do not",
    "must not",
    "mustn't",
    "forbidden",
    "prohibited",
    "avoid",
    "stop",
];

/// Phrases that mark ordered steps
const PROCEDURE_SIGNALS: &[&str] = &[
    "first",
    "then",
    "after that",
    "finally",
    "step 1",
    "step 2",
    "workflow",
    "process",
];

/// Phrases that mark a preference
const PREFERENCE_SIGNALS: &[&str] = &[
    "prefer",
    "instead of",
    "rather than",
    "better to",
    "favor",
    "prioritize",
];

/// Leading path components too generic to scope on
const PATH_SKIP_LIST: &[&str] = &["", ".", "src", "lib", "pkg", "app", "home", "usr", "var", "internal"];

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Produces candidate behaviors from corrections
#[derive(Debug, Clone)]
pub struct Extractor {
    tagger: Tagger,
    known_tasks: BTreeSet<String>,
}

impl Extractor {
    /// Extractor with the given task allow-list
    pub fn new(tagger: Tagger, known_tasks: BTreeSet<String>) -> Self {
        Self {
            tagger,
            known_tasks,
        }
    }

    /// Extract a candidate behavior.
    ///
    /// Fails with a validation error when sanitization reduces the
    /// corrected action to nothing; nothing is persisted in that case.
    pub fn extract(&self, correction: &Correction) -> Result<Behavior, LearningError> {
        let canonical = sanitize_content(correction.corrected_action.trim());
        if canonical.trim().is_empty() {
            return Err(LearningError::Extraction(
                "corrected action is empty after sanitization".to_string(),
            ));
        }
        let avoid = sanitize_content(correction.agent_action.trim());
        let avoid = (!avoid.trim().is_empty()).then_some(avoid);

        let kind = infer_kind(&correction.corrected_action, &correction.agent_action);
        let when = infer_when(correction, &self.known_tasks);

        let expanded = avoid.as_ref().map(|avoid| {
            format!(
                "When working on this type of task, avoid: {}\n\nInstead: {}",
                avoid, canonical
            )
        });

        let name_source: String = canonical.chars().take(NAME_SOURCE_CAP).collect();
        let name = format!("{}{}", LEARNED_NAME_PREFIX, slugify(&name_source));

        let mut content = BehaviorContent {
            canonical: canonical.clone(),
            expanded,
            summary: None,
            structured: StructuredContent {
                avoid,
                prefer: Some(canonical.clone()),
            },
            tags: Vec::new(),
        };
        content.set_tags(self.tagger.tags_for(&canonical));

        Ok(Behavior {
            id: Behavior::id_for(&correction.agent_action, &correction.corrected_action),
            name,
            kind,
            when,
            content,
            confidence: DEFAULT_LEARNED_CONFIDENCE,
            priority: 0,
            provenance: Provenance::learned(&correction.id),
            stats: Default::default(),
        })
    }
}

/// Priority-ordered kind inference over the lowercased corrected action,
/// then the agent action.
fn infer_kind(corrected_action: &str, agent_action: &str) -> BehaviorKind {
    let corrected = corrected_action.to_lowercase();
    let agent = agent_action.to_lowercase();
    let contains_any =
        |signals: &[&str]| signals.iter().any(|s| corrected.contains(s) || agent.contains(s));

    if contains_any(CONSTRAINT_SIGNALS) {
        return BehaviorKind::Constraint;
    }
    if contains_any(PROCEDURE_SIGNALS) {
        return BehaviorKind::Procedure;
    }
    if contains_any(PREFERENCE_SIGNALS) {
        return BehaviorKind::Preference;
    }
    if !corrected.is_empty()
        && !agent.is_empty()
        && (corrected.contains("instead") || corrected.contains("use"))
    {
        return BehaviorKind::Preference;
    }
    BehaviorKind::Directive
}

/// Derive the `when` predicate from the snapshot: language when captured,
/// a generalized directory pattern when the path has a non-generic one,
/// and the task when it is on the allow-list.
fn infer_when(correction: &Correction, known_tasks: &BTreeSet<String>) -> WhenPredicate {
    let mut when = WhenPredicate::new();

    if let Some(language) = correction.context.file_language() {
        when.insert(keys::LANGUAGE, WhenValue::scalar(language));
    }

    if let Some(path) = correction.context.file_path() {
        if let Some(pattern) = generalize_path(path) {
            when.insert(keys::FILE_PATH, WhenValue::scalar(pattern));
        }
    }

    if let Some(task) = correction.context.task() {
        if known_tasks.contains(task) {
            when.insert(keys::TASK, WhenValue::scalar(task));
        }
    }

    when
}

/// First directory component not on the skip list, suffixed `/*`. The file
/// name itself never scopes anything.
fn generalize_path(path: &str) -> Option<String> {
    let mut components: Vec<&str> = path.split('/').collect();
    components.pop(); // file name
    components
        .into_iter()
        .find(|c| !PATH_SKIP_LIST.contains(c))
        .map(|c| format!("{}/*", c))
}

// ============================================================================
// TESTS
// ============================================================================
