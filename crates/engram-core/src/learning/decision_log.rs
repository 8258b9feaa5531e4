//! Decision log
//!
//! Append-only JSONL record of every learning decision. Each append opens
//! the file, writes one line, and releases the handle; the log is the audit
//! trail for auto-accepted and review-gated behaviors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome recorded for a learning decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Behavior persisted without review
    AutoAccept,
    /// Behavior persisted but held for human review
    ReviewRequired,
    /// Pending behavior approved by a human
    Approved,
    /// Pending behavior rejected by a human
    Rejected,
}

/// One decision-log event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEvent {
    /// Event id
    pub id: String,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
    /// Outcome
    pub outcome: DecisionOutcome,
    /// Behavior the decision concerns
    pub behavior_id: String,
    /// Confidence that was evaluated
    pub confidence: f64,
    /// Threshold it was evaluated against
    pub threshold: f64,
    /// Review reasons, empty for auto-accepts
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl DecisionEvent {
    /// New event stamped now
    pub fn new(
        outcome: DecisionOutcome,
        behavior_id: impl Into<String>,
        confidence: f64,
        threshold: f64,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            outcome,
            behavior_id: behavior_id.into(),
            confidence,
            threshold,
            reasons,
        }
    }
}

/// Append-only JSONL decision log
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    /// Log writing to `path`, creating parent directories owner-only
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }
        Ok(Self { path })
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single JSON line. The file handle is scoped to
    /// this call.
    pub fn append(&self, event: &DecisionEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Read all events back (diagnostics and tests)
    pub fn read_all(&self) -> std::io::Result<Vec<DecisionEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: DecisionEvent = serde_json::from_str(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            events.push(event);
        }
        Ok(events)
    }
}

// ============================================================================
// TESTS
// ============================================================================
