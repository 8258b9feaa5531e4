//! Database Migrations
//!
//! Schema migration definitions for the graph store.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: behaviors, edges",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Hebbian creation-gate counters and correction audit trail",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: behaviors and edges
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS behaviors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'directive',
    when_predicate TEXT NOT NULL DEFAULT '{}',

    -- Content
    canonical TEXT NOT NULL,
    expanded TEXT,
    summary TEXT,
    avoid TEXT,
    prefer TEXT,
    tags TEXT NOT NULL DEFAULT '[]',

    confidence REAL NOT NULL DEFAULT 1.0,
    priority INTEGER NOT NULL DEFAULT 0,

    -- Provenance
    source_type TEXT NOT NULL DEFAULT 'manual',
    provenance_created_at TEXT NOT NULL,
    author TEXT,
    correction_id TEXT,
    approved_by TEXT,
    rejected_by TEXT,
    review_note TEXT,

    -- Stats
    times_activated INTEGER NOT NULL DEFAULT 0,
    times_followed INTEGER NOT NULL DEFAULT 0,
    times_confirmed INTEGER NOT NULL DEFAULT 0,
    times_overridden INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_activated TEXT,
    last_confirmed TEXT
);

CREATE INDEX IF NOT EXISTS idx_behaviors_kind ON behaviors(kind);
CREATE INDEX IF NOT EXISTS idx_behaviors_name ON behaviors(name);

CREATE TABLE IF NOT EXISTS edges (
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    kind TEXT NOT NULL,
    weight REAL NOT NULL,
    created_at TEXT NOT NULL,
    last_activated TEXT,
    PRIMARY KEY (source, target, kind)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
"#;

/// V2: restart-safe co-activation counters + correction records
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS co_activation_counters (
    pair_key TEXT PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0,
    window_start TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS corrections (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '{}',
    agent_action TEXT NOT NULL,
    human_response TEXT NOT NULL DEFAULT '',
    corrected_action TEXT NOT NULL,
    conversation_id TEXT,
    turn INTEGER,
    corrected_by TEXT,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_corrections_processed ON corrections(processed);
"#;

/// Apply all pending migrations in version order
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, description, applied_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.description,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
    }

    Ok(())
}
