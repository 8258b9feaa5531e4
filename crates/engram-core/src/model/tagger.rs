//! Keyword tagger
//!
//! Derives a small set of canonical tags from behavior text by tokenizing
//! and looking tokens up in a fixed dictionary. Tags feed the similarity
//! composite (Jaccard) and the store's tag filters.

use std::collections::{BTreeSet, HashMap};

/// Maximum number of tags kept per behavior
pub const MAX_TAGS: usize = 8;

/// Keyword → canonical tags. Case-insensitive on lookup; unknown tokens
/// produce no tag. Kept deliberately small: languages, tools, and a few
/// recurring concepts.
const DICTIONARY: &[(&str, &[&str])] = &[
    // Languages
    ("python", &["python"]),
    ("py", &["python"]),
    ("rust", &["rust"]),
    ("cargo", &["rust", "tooling"]),
    ("go", &["go"]),
    ("golang", &["go"]),
    ("javascript", &["javascript"]),
    ("js", &["javascript"]),
    ("typescript", &["typescript"]),
    ("ts", &["typescript"]),
    ("sql", &["database"]),
    ("bash", &["shell"]),
    ("shell", &["shell"]),
    // Tools
    ("pip", &["python", "packaging"]),
    ("uv", &["python", "packaging"]),
    ("npm", &["javascript", "packaging"]),
    ("pnpm", &["javascript", "packaging"]),
    ("docker", &["docker"]),
    ("kubernetes", &["kubernetes"]),
    ("k8s", &["kubernetes"]),
    ("git", &["git"]),
    ("commit", &["git"]),
    ("rebase", &["git"]),
    ("branch", &["git"]),
    ("merge", &["git"]),
    ("make", &["tooling"]),
    ("makefile", &["tooling"]),
    // Concepts
    ("test", &["testing"]),
    ("tests", &["testing"]),
    ("testing", &["testing"]),
    ("pytest", &["python", "testing"]),
    ("mock", &["testing"]),
    ("error", &["error-handling"]),
    ("errors", &["error-handling"]),
    ("exception", &["error-handling"]),
    ("panic", &["error-handling"]),
    ("async", &["async"]),
    ("await", &["async"]),
    ("concurrency", &["async"]),
    ("log", &["logging"]),
    ("logging", &["logging"]),
    ("logs", &["logging"]),
    ("secret", &["security"]),
    ("secrets", &["security"]),
    ("security", &["security"]),
    ("auth", &["security"]),
    ("password", &["security"]),
    ("database", &["database"]),
    ("db", &["database"]),
    ("migration", &["database"]),
    ("api", &["api"]),
    ("endpoint", &["api"]),
    ("http", &["api"]),
    ("ci", &["ci"]),
    ("pipeline", &["ci"]),
    ("deploy", &["deployment"]),
    ("deployment", &["deployment"]),
    ("release", &["deployment"]),
    ("lint", &["lint"]),
    ("format", &["lint"]),
    ("style", &["lint"]),
    ("docs", &["documentation"]),
    ("documentation", &["documentation"]),
    ("readme", &["documentation"]),
];

// ============================================================================
// TAGGER
// ============================================================================

/// Token → canonical-tag lookup over the fixed dictionary, optionally
/// extended with project-specific entries at construction time.
#[derive(Debug, Clone)]
pub struct Tagger {
    dictionary: HashMap<String, Vec<String>>,
}

impl Default for Tagger {
    fn default() -> Self {
        let mut dictionary = HashMap::with_capacity(DICTIONARY.len());
        for (keyword, tags) in DICTIONARY {
            dictionary.insert(
                (*keyword).to_string(),
                tags.iter().map(|t| (*t).to_string()).collect(),
            );
        }
        Self { dictionary }
    }
}

impl Tagger {
    /// Dictionary tagger with extra project-specific entries layered on top
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut tagger = Self::default();
        for (keyword, tags) in entries {
            tagger.dictionary.insert(keyword.to_lowercase(), tags);
        }
        tagger
    }

    /// Extract up to [`MAX_TAGS`] sorted, deduplicated canonical tags
    pub fn tags_for(&self, text: &str) -> Vec<String> {
        let mut tags: BTreeSet<String> = BTreeSet::new();
        for token in tokenize(text) {
            if let Some(canonical) = self.dictionary.get(&token) {
                tags.extend(canonical.iter().cloned());
            }
        }
        tags.into_iter().take(MAX_TAGS).collect()
    }
}

/// Tokenize into lowercased ASCII letter runs, keeping `-`/`_` joined
/// compounds together ("memory-safety" stays one token).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_alphabetic() {
            i += 1;
            continue;
        }
        let mut token = String::new();
        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii_alphabetic() {
                token.push(c.to_ascii_lowercase());
                i += 1;
            } else if (c == '-' || c == '_')
                && i + 1 < chars.len()
                && chars[i + 1].is_ascii_alphabetic()
            {
                token.push(c);
                i += 1;
            } else {
                break;
            }
        }
        tokens.push(token);
    }
    tokens
}

/// Jaccard index over two tag (or token) sets.
///
/// Both empty yields 1.0 by convention; callers that need a missing-signal
/// sentinel check emptiness before calling.
pub fn jaccard<S: AsRef<str> + Ord>(a: &[S], b: &[S]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let sa: BTreeSet<&str> = a.iter().map(AsRef::as_ref).collect();
    let sb: BTreeSet<&str> = b.iter().map(AsRef::as_ref).collect();
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

// ============================================================================
// TESTS
// ============================================================================
