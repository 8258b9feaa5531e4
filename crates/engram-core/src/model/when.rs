//! When predicates and context snapshots
//!
//! A behavior carries an optional `when` predicate: a mapping from context
//! keys (language, task, branch, ...) to either a single scalar value or a
//! set of candidate values. At turn time the agent reports a context
//! snapshot with the same open shape; the seed selector evaluates each
//! behavior's predicate against the snapshot to decide whether the behavior
//! applies and how specifically.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Well-known context keys. The snapshot side reports the language of the
/// current file as `file_language`; the behavior side scopes on `language`.
pub mod keys {
    /// Language key on the behavior (`when`) side
    pub const LANGUAGE: &str = "language";
    /// Language key on the snapshot side
    pub const FILE_LANGUAGE: &str = "file_language";
    /// Path (or generalized path pattern) of the current file
    pub const FILE_PATH: &str = "file_path";
    /// Current task label
    pub const TASK: &str = "task";
    /// Execution environment (dev, prod, ci, ...)
    pub const ENVIRONMENT: &str = "environment";
    /// Git branch
    pub const BRANCH: &str = "branch";
    /// User identity
    pub const USER: &str = "user";
}

// ============================================================================
// WHEN VALUE
// ============================================================================

/// A value in a `when` predicate or a context snapshot.
///
/// Either a single scalar or a set of acceptable candidates. Two values
/// match when they share at least one concrete candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenValue {
    /// A single concrete value
    Scalar(String),
    /// A set of acceptable candidate values
    Set(BTreeSet<String>),
}

impl WhenValue {
    /// Create a scalar value
    pub fn scalar(value: impl Into<String>) -> Self {
        WhenValue::Scalar(value.into())
    }

    /// Create a set value from candidates
    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WhenValue::Set(values.into_iter().map(Into::into).collect())
    }

    /// The scalar content, if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            WhenValue::Scalar(s) => Some(s),
            WhenValue::Set(_) => None,
        }
    }

    /// Check whether two values are compatible: equal scalars, a scalar
    /// contained in the other side's set, or intersecting sets.
    pub fn matches(&self, other: &WhenValue) -> bool {
        match (self, other) {
            (WhenValue::Scalar(a), WhenValue::Scalar(b)) => a == b,
            (WhenValue::Scalar(a), WhenValue::Set(b)) => b.contains(a),
            (WhenValue::Set(a), WhenValue::Scalar(b)) => a.contains(b),
            (WhenValue::Set(a), WhenValue::Set(b)) => a.intersection(b).next().is_some(),
        }
    }

    /// Render for display in source labels and logs.
    ///
    /// Sets render as their candidates joined with `|`, sorted.
    pub fn display(&self) -> String {
        match self {
            WhenValue::Scalar(s) => s.clone(),
            WhenValue::Set(set) => set.iter().cloned().collect::<Vec<_>>().join("|"),
        }
    }
}

// ============================================================================
// WHEN PREDICATE
// ============================================================================

/// Outcome of evaluating a `when` predicate against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum WhenMatch {
    /// At least one key is present in the snapshot with a different value
    Excluded,
    /// No key contradicted; `specificity` counts confirmed keys
    Matched {
        /// Number of keys confirmed by the snapshot
        specificity: usize,
        /// The confirmed key/value pairs, keyed by predicate key
        confirmed: BTreeMap<String, String>,
    },
}

/// A behavior's applicability predicate.
///
/// Empty means unscoped: the behavior is always a candidate ("always-active").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhenPredicate(BTreeMap<String, WhenValue>);

impl WhenPredicate {
    /// Empty (unscoped) predicate
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/value condition
    pub fn insert(&mut self, key: impl Into<String>, value: WhenValue) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: WhenValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Value for a key
    pub fn get(&self, key: &str) -> Option<&WhenValue> {
        self.0.get(key)
    }

    /// Whether the predicate scopes on the given key
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when unscoped
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate conditions in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WhenValue)> {
        self.0.iter()
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Permissive overlap used as a candidate prefilter: either side
    /// unscoped, or the key sets intersect.
    pub fn overlaps(&self, other: &WhenPredicate) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }
        self.0.keys().any(|k| other.0.contains_key(k))
    }

    /// Strictly-more-specific: `self` has more conditions than `other`,
    /// `other` is non-empty, and every condition of `other` appears in
    /// `self` with an equal value.
    ///
    /// Irreflexive and asymmetric; false whenever either side is empty.
    pub fn is_more_specific_than(&self, other: &WhenPredicate) -> bool {
        if other.is_empty() || self.len() <= other.len() {
            return false;
        }
        other
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|own| own == v))
    }

    /// Evaluate against a snapshot.
    ///
    /// A key present in the snapshot with a compatible value confirms; a key
    /// absent from the snapshot neither confirms nor contradicts; a key
    /// present with an incompatible value excludes the behavior outright.
    pub fn matches_snapshot(&self, snapshot: &ContextSnapshot) -> WhenMatch {
        let mut confirmed = BTreeMap::new();
        for (key, want) in self.iter() {
            match snapshot.value_for(key) {
                None => {}
                Some(have) => {
                    if want.matches(have) {
                        confirmed.insert(key.clone(), want.display());
                    } else {
                        return WhenMatch::Excluded;
                    }
                }
            }
        }
        WhenMatch::Matched {
            specificity: confirmed.len(),
            confirmed,
        }
    }
}

impl FromIterator<(String, WhenValue)> for WhenPredicate {
    fn from_iter<T: IntoIterator<Item = (String, WhenValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// CONTEXT SNAPSHOT
// ============================================================================

/// An open snapshot of the agent's current context.
///
/// Carries at least file_language, file_path, task, environment, branch and
/// user when known, plus arbitrary extensions. Values may be scalar or
/// set-of-candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSnapshot(BTreeMap<String, WhenValue>);

impl ContextSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: WhenValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Insert a key/value entry
    pub fn insert(&mut self, key: impl Into<String>, value: WhenValue) {
        self.0.insert(key.into(), value);
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Option<&WhenValue> {
        self.0.get(key)
    }

    /// Value for a behavior-side key.
    ///
    /// The behavior side scopes languages under `language` while snapshots
    /// report `file_language`; both spellings name the same fact, so lookup
    /// of `language` falls back to `file_language`.
    pub fn value_for(&self, key: &str) -> Option<&WhenValue> {
        match self.0.get(key) {
            Some(v) => Some(v),
            None if key == keys::LANGUAGE => self.0.get(keys::FILE_LANGUAGE),
            None => None,
        }
    }

    /// True when no context was captured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WhenValue)> {
        self.0.iter()
    }

    /// Language of the current file, if captured as a scalar
    pub fn file_language(&self) -> Option<&str> {
        self.0.get(keys::FILE_LANGUAGE).and_then(WhenValue::as_scalar)
    }

    /// Path of the current file, if captured as a scalar
    pub fn file_path(&self) -> Option<&str> {
        self.0.get(keys::FILE_PATH).and_then(WhenValue::as_scalar)
    }

    /// Current task label, if captured as a scalar
    pub fn task(&self) -> Option<&str> {
        self.0.get(keys::TASK).and_then(WhenValue::as_scalar)
    }

    /// Execution environment, if captured as a scalar
    pub fn environment(&self) -> Option<&str> {
        self.0.get(keys::ENVIRONMENT).and_then(WhenValue::as_scalar)
    }

    /// Git branch, if captured as a scalar
    pub fn branch(&self) -> Option<&str> {
        self.0.get(keys::BRANCH).and_then(WhenValue::as_scalar)
    }

    /// User identity, if captured as a scalar
    pub fn user(&self) -> Option<&str> {
        self.0.get(keys::USER).and_then(WhenValue::as_scalar)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, &str)]) -> ContextSnapshot {
        let mut s = ContextSnapshot::new();
        for (k, v) in pairs {
            s.insert(*k, WhenValue::scalar(*v));
        }
        s
    }

    #[test]
    fn test_value_matching_scalar_and_set() {
        let scalar = WhenValue::scalar("python");
        let set = WhenValue::set(["python", "rust"]);
        let other = WhenValue::scalar("go");

        assert!(scalar.matches(&WhenValue::scalar("python")));
        assert!(scalar.matches(&set));
        assert!(set.matches(&scalar));
        assert!(!scalar.matches(&other));
        assert!(set.matches(&WhenValue::set(["rust", "zig"])));
        assert!(!set.matches(&WhenValue::set(["zig", "c"])));
    }

    #[test]
    fn test_language_falls_back_to_file_language() {
        let s = snap(&[("file_language", "python")]);
        let when = WhenPredicate::new().with("language", WhenValue::scalar("python"));
        match when.matches_snapshot(&s) {
            WhenMatch::Matched { specificity, .. } => assert_eq!(specificity, 1),
            WhenMatch::Excluded => panic!("language should match file_language"),
        }
    }

    #[test]
    fn test_contradiction_excludes() {
        let s = snap(&[("file_language", "go"), ("task", "testing")]);
        let when = WhenPredicate::new()
            .with("language", WhenValue::scalar("python"))
            .with("task", WhenValue::scalar("testing"));
        assert_eq!(when.matches_snapshot(&s), WhenMatch::Excluded);
    }

    #[test]
    fn test_absent_key_is_not_a_contradiction() {
        let s = snap(&[("task", "testing")]);
        let when = WhenPredicate::new()
            .with("branch", WhenValue::scalar("main"))
            .with("task", WhenValue::scalar("testing"));
        match when.matches_snapshot(&s) {
            WhenMatch::Matched {
                specificity,
                confirmed,
            } => {
                assert_eq!(specificity, 1);
                assert!(confirmed.contains_key("task"));
                assert!(!confirmed.contains_key("branch"));
            }
            WhenMatch::Excluded => panic!("absent key must not exclude"),
        }
    }

    #[test]
    fn test_empty_predicate_matches_with_zero_specificity() {
        let when = WhenPredicate::new();
        match when.matches_snapshot(&snap(&[("task", "testing")])) {
            WhenMatch::Matched { specificity, .. } => assert_eq!(specificity, 0),
            WhenMatch::Excluded => panic!("unscoped predicate always matches"),
        }
    }

    #[test]
    fn test_more_specific_is_irreflexive_and_asymmetric() {
        let narrow = WhenPredicate::new().with("language", WhenValue::scalar("python"));
        let wide = WhenPredicate::new()
            .with("language", WhenValue::scalar("python"))
            .with("task", WhenValue::scalar("testing"));

        assert!(wide.is_more_specific_than(&narrow));
        assert!(!narrow.is_more_specific_than(&wide));
        assert!(!wide.is_more_specific_than(&wide));
        assert!(!narrow.is_more_specific_than(&narrow));
    }

    #[test]
    fn test_more_specific_false_for_empty_sides() {
        let empty = WhenPredicate::new();
        let scoped = WhenPredicate::new().with("task", WhenValue::scalar("testing"));
        assert!(!scoped.is_more_specific_than(&empty));
        assert!(!empty.is_more_specific_than(&scoped));
        assert!(!empty.is_more_specific_than(&empty));
    }

    #[test]
    fn test_more_specific_requires_equal_values() {
        let a = WhenPredicate::new()
            .with("language", WhenValue::scalar("python"))
            .with("task", WhenValue::scalar("testing"));
        let b = WhenPredicate::new().with("language", WhenValue::scalar("rust"));
        assert!(!a.is_more_specific_than(&b));
    }

    #[test]
    fn test_overlap_permissive() {
        let empty = WhenPredicate::new();
        let a = WhenPredicate::new().with("language", WhenValue::scalar("python"));
        let b = WhenPredicate::new().with("language", WhenValue::scalar("rust"));
        let c = WhenPredicate::new().with("branch", WhenValue::scalar("main"));

        assert!(empty.overlaps(&a));
        assert!(a.overlaps(&empty));
        assert!(a.overlaps(&b)); // shared key, even with different values
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_when_value_serde_untagged() {
        let scalar: WhenValue = serde_json::from_str(r#""python""#).unwrap();
        assert_eq!(scalar, WhenValue::scalar("python"));

        let set: WhenValue = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(set, WhenValue::set(["a", "b"]));
    }
}
