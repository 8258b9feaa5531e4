//! Correction - the raw input to learning
//!
//! A correction captures a mismatch between what the agent did and what the
//! human wanted, together with the context in which it happened. Correction
//! ids are content-addressed over the truncated wrong/right pair so repeated
//! reports of the same mistake collapse onto one record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::when::ContextSnapshot;

/// Prefix of every correction id
pub const CORRECTION_ID_PREFIX: &str = "correction-";

/// Characters of each action that participate in the id
const ID_TEXT_CAP: usize = 100;

/// Hex digits kept from the content digest
const ID_DIGEST_LEN: usize = 16;

/// An observed correction reported by the agent harness.
///
/// Uses `deny_unknown_fields`: corrections arrive from outside the trust
/// boundary and field injection is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Correction {
    /// Content-addressed id, `correction-` prefixed
    pub id: String,
    /// When the correction was observed
    pub timestamp: DateTime<Utc>,
    /// Context at the moment of the correction
    #[serde(default)]
    pub context: ContextSnapshot,
    /// What the agent did
    pub agent_action: String,
    /// The raw human message, verbatim
    #[serde(default)]
    pub human_response: String,
    /// What the agent should have done
    pub corrected_action: String,
    /// Conversation the correction happened in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Turn number within the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<i64>,
    /// Identity of the human who corrected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_by: Option<String>,
    /// Whether the learning loop already consumed this record
    #[serde(default)]
    pub processed: bool,
}

impl Correction {
    /// New correction with a computed id and current timestamp
    pub fn new(
        agent_action: impl Into<String>,
        corrected_action: impl Into<String>,
        context: ContextSnapshot,
    ) -> Self {
        let agent_action = agent_action.into();
        let corrected_action = corrected_action.into();
        Self {
            id: Self::id_for(&agent_action, &corrected_action),
            timestamp: Utc::now(),
            context,
            agent_action,
            human_response: String::new(),
            corrected_action,
            conversation_id: None,
            turn: None,
            corrected_by: None,
            processed: false,
        }
    }

    /// Content-addressed correction id over the wrong/right pair, each side
    /// truncated to 100 characters before hashing.
    pub fn id_for(wrong: &str, right: &str) -> String {
        let wrong: String = wrong.chars().take(ID_TEXT_CAP).collect();
        let right: String = right.chars().take(ID_TEXT_CAP).collect();
        let mut hasher = Sha256::new();
        hasher.update(wrong.as_bytes());
        hasher.update([0x1f]);
        hasher.update(right.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(ID_DIGEST_LEN)
            .collect();
        format!("{}{}", CORRECTION_ID_PREFIX, hex)
    }
}

// ============================================================================
// TESTS
// ============================================================================
