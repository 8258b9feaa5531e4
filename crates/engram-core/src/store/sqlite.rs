//! SQLite Graph Store Implementation
//!
//! Dual-connection layout: one writer serializing all mutations through
//! transactions, one reader serving concurrent queries. WAL journal mode
//! keeps readers unblocked while a writer commits.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::model::{
    clamp_weight, Behavior, BehaviorContent, BehaviorStats, Correction, EdgeKind, GraphEdge,
    Provenance, SourceType,
};

use super::{
    pair_key, BehaviorFilter, CoActivationCandidate, Direction, EdgeWeightUpdate, GraphDump,
    GraphStore, HebbianReport, Result, StoreError,
};

/// Bounded retries for transient write contention
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Shared column list for behavior selects and inserts
const BEHAVIOR_COLUMNS: &str = "id, name, kind, when_predicate, canonical, expanded, summary, \
     avoid, prefer, tags, confidence, priority, source_type, provenance_created_at, author, \
     correction_id, approved_by, rejected_by, review_note, times_activated, times_followed, \
     times_confirmed, times_overridden, created_at, updated_at, last_activated, last_confirmed";

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed [`GraphStore`].
///
/// All methods take `&self`; interior mutability through per-connection
/// mutexes makes the store `Send + Sync` so sessions can share an
/// `Arc<SqliteStore>` directly.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store. With `None` the database lands in the
    /// platform data directory, created owner-only.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "engram", "core").ok_or_else(|| {
                    StoreError::Init("Could not determine project directories".to_string())
                })?;

                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("engram.db")
            }
        };

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn ensure_live(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".to_string()))
    }

    /// Run `f` inside a writer transaction. The transaction commits only if
    /// `f` succeeds and the token is still live; otherwise it rolls back on
    /// drop and the store is unchanged. Busy errors retry a bounded number
    /// of times.
    fn with_writer<T>(
        &self,
        cancel: &CancellationToken,
        f: impl Fn(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        Self::ensure_live(cancel)?;
        let mut attempt = 0;
        loop {
            let result = {
                let mut guard = self
                    .writer
                    .lock()
                    .map_err(|_| StoreError::Init("Writer lock poisoned".to_string()))?;
                let tx = guard.transaction()?;
                match f(&tx) {
                    Ok(value) => {
                        Self::ensure_live(cancel)?;
                        tx.commit()?;
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            };
            match result {
                Err(StoreError::Database(ref e)) if is_busy(e) && attempt < MAX_WRITE_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(attempt, "write contention, retrying transaction");
                    std::thread::sleep(std::time::Duration::from_millis(20 * attempt as u64));
                }
                other => return other,
            }
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn json_err(idx: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn behavior_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Behavior> {
    let when_json: String = row.get(3)?;
    let tags_json: String = row.get(9)?;
    let kind: String = row.get(2)?;
    let source_type: String = row.get(12)?;

    Ok(Behavior {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: crate::model::BehaviorKind::parse_name(&kind),
        when: serde_json::from_str(&when_json).map_err(|e| json_err(3, e))?,
        content: BehaviorContent {
            canonical: row.get(4)?,
            expanded: row.get(5)?,
            summary: row.get(6)?,
            structured: crate::model::StructuredContent {
                avoid: row.get(7)?,
                prefer: row.get(8)?,
            },
            tags: serde_json::from_str(&tags_json).map_err(|e| json_err(9, e))?,
        },
        confidence: row.get(10)?,
        priority: row.get(11)?,
        provenance: Provenance {
            source_type: SourceType::parse_name(&source_type),
            created_at: row.get(13)?,
            author: row.get(14)?,
            correction_id: row.get(15)?,
            approved_by: row.get(16)?,
            rejected_by: row.get(17)?,
            review_note: row.get(18)?,
        },
        stats: BehaviorStats {
            times_activated: row.get(19)?,
            times_followed: row.get(20)?,
            times_confirmed: row.get(21)?,
            times_overridden: row.get(22)?,
            created_at: row.get(23)?,
            updated_at: row.get(24)?,
            last_activated: row.get(25)?,
            last_confirmed: row.get(26)?,
        },
    })
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEdge> {
    let kind: String = row.get(2)?;
    Ok(GraphEdge {
        source: row.get(0)?,
        target: row.get(1)?,
        kind: kind.parse::<EdgeKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        weight: row.get(3)?,
        created_at: row.get(4)?,
        last_activated: row.get(5)?,
    })
}

fn insert_behavior(tx: &Transaction<'_>, b: &Behavior) -> Result<()> {
    let when_json = serde_json::to_string(&b.when)
        .map_err(|e| StoreError::Validation(format!("when predicate not serializable: {}", e)))?;
    let tags_json = serde_json::to_string(&b.content.tags)
        .map_err(|e| StoreError::Validation(format!("tags not serializable: {}", e)))?;
    tx.execute(
        &format!(
            "INSERT INTO behaviors ({BEHAVIOR_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
            )"
        ),
        params![
            b.id,
            b.name,
            b.kind.as_str(),
            when_json,
            b.content.canonical,
            b.content.expanded,
            b.content.summary,
            b.content.structured.avoid,
            b.content.structured.prefer,
            tags_json,
            b.confidence,
            b.priority,
            b.provenance.source_type.as_str(),
            b.provenance.created_at,
            b.provenance.author,
            b.provenance.correction_id,
            b.provenance.approved_by,
            b.provenance.rejected_by,
            b.provenance.review_note,
            b.stats.times_activated,
            b.stats.times_followed,
            b.stats.times_confirmed,
            b.stats.times_overridden,
            b.stats.created_at,
            b.stats.updated_at,
            b.stats.last_activated,
            b.stats.last_confirmed,
        ],
    )
    .map_err(|e| {
        if is_constraint(&e) {
            StoreError::Conflict(format!("behavior already exists: {}", b.id))
        } else {
            StoreError::Database(e)
        }
    })?;
    Ok(())
}

fn insert_edge(tx: &Transaction<'_>, edge: &GraphEdge) -> Result<()> {
    if edge.is_self_loop() {
        return Err(StoreError::Conflict(format!(
            "self-loop rejected: {}",
            edge.source
        )));
    }
    tx.execute(
        "INSERT INTO edges (source, target, kind, weight, created_at, last_activated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(source, target, kind) DO UPDATE SET
            weight = excluded.weight,
            last_activated = COALESCE(excluded.last_activated, edges.last_activated)",
        params![
            edge.source,
            edge.target,
            edge.kind.as_str(),
            clamp_weight(edge.weight),
            edge.created_at,
            edge.last_activated,
        ],
    )?;
    Ok(())
}

/// Prepare a behavior for persistence: clamp confidence, normalize tags,
/// then validate invariants.
fn normalized(behavior: &Behavior) -> Result<Behavior> {
    let mut b = behavior.clone();
    b.clamp_confidence();
    b.content.normalize();
    b.validate().map_err(StoreError::Validation)?;
    Ok(b)
}

// ============================================================================
// GRAPH STORE IMPL
// ============================================================================

impl GraphStore for SqliteStore {
    fn add_behavior(&self, cancel: &CancellationToken, behavior: &Behavior) -> Result<()> {
        let b = normalized(behavior)?;
        self.with_writer(cancel, |tx| insert_behavior(tx, &b))
    }

    fn get_behavior(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Behavior>> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let behavior = reader
            .query_row(
                &format!("SELECT {BEHAVIOR_COLUMNS} FROM behaviors WHERE id = ?1"),
                params![id],
                behavior_from_row,
            )
            .optional()?;
        Ok(behavior)
    }

    fn update_behavior(&self, cancel: &CancellationToken, behavior: &Behavior) -> Result<()> {
        let b = normalized(behavior)?;
        self.with_writer(cancel, |tx| {
            let changed = tx.execute("DELETE FROM behaviors WHERE id = ?1", params![b.id])?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("unknown behavior: {}", b.id)));
            }
            insert_behavior(tx, &b)
        })
    }

    fn query_behaviors(
        &self,
        cancel: &CancellationToken,
        filter: &BehaviorFilter,
    ) -> Result<Vec<Behavior>> {
        Self::ensure_live(cancel)?;

        let mut sql = format!("SELECT {BEHAVIOR_COLUMNS} FROM behaviors WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(Box::new(kind.as_str().to_string()));
        } else if !filter.include_curated {
            sql.push_str(" AND kind NOT IN ('forgotten', 'deprecated', 'merged')");
        }
        if let Some(tag) = &filter.tag {
            sql.push_str(" AND tags LIKE ?");
            args.push(Box::new(format!("%\"{}\"%", tag)));
        }
        sql.push_str(" ORDER BY id");

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), behavior_from_row)?;

        let mut behaviors = Vec::new();
        for row in rows {
            behaviors.push(row?);
        }
        drop(stmt);
        drop(reader);

        // Best-effort when-overlap prefilter resolves in memory; the key
        // sets are tiny compared to the table scan above.
        if let Some(when) = &filter.when_overlaps {
            behaviors.retain(|b| b.when.overlaps(when));
        }

        Ok(behaviors)
    }

    fn count_behaviors(&self, cancel: &CancellationToken) -> Result<i64> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let count = reader.query_row("SELECT COUNT(*) FROM behaviors", [], |r| r.get(0))?;
        Ok(count)
    }

    fn add_edge(&self, cancel: &CancellationToken, edge: &GraphEdge) -> Result<()> {
        if !edge.weight.is_finite() {
            return Err(StoreError::Validation(format!(
                "non-finite edge weight: {} -> {}",
                edge.source, edge.target
            )));
        }
        self.with_writer(cancel, |tx| insert_edge(tx, edge))
    }

    fn get_edge(
        &self,
        cancel: &CancellationToken,
        source: &str,
        target: &str,
        kind: EdgeKind,
    ) -> Result<Option<GraphEdge>> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let edge = reader
            .query_row(
                "SELECT source, target, kind, weight, created_at, last_activated
                 FROM edges WHERE source = ?1 AND target = ?2 AND kind = ?3",
                params![source, target, kind.as_str()],
                edge_from_row,
            )
            .optional()?;
        Ok(edge)
    }

    fn get_edges(
        &self,
        cancel: &CancellationToken,
        node_id: &str,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<GraphEdge>> {
        Self::ensure_live(cancel)?;

        let clause = match direction {
            Direction::Inbound => "target = ?1",
            Direction::Outbound => "source = ?1",
            Direction::Both => "(source = ?1 OR target = ?1)",
        };
        let mut sql = format!(
            "SELECT source, target, kind, weight, created_at, last_activated
             FROM edges WHERE {clause}"
        );
        if kind.is_some() {
            sql.push_str(" AND kind = ?2");
        }
        sql.push_str(" ORDER BY source, target, kind");

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let edges: Vec<GraphEdge> = match kind {
            Some(k) => stmt
                .query_map(params![node_id, k.as_str()], edge_from_row)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map(params![node_id], edge_from_row)?
                .collect::<rusqlite::Result<_>>()?,
        };
        Ok(edges)
    }

    fn remove_edge(
        &self,
        cancel: &CancellationToken,
        source: &str,
        target: &str,
        kind: EdgeKind,
    ) -> Result<bool> {
        self.with_writer(cancel, |tx| {
            let changed = tx.execute(
                "DELETE FROM edges WHERE source = ?1 AND target = ?2 AND kind = ?3",
                params![source, target, kind.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    fn count_edges(&self, cancel: &CancellationToken) -> Result<i64> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let count = reader.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
        Ok(count)
    }

    fn batch_update_edge_weights(
        &self,
        cancel: &CancellationToken,
        updates: &[EdgeWeightUpdate],
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        self.with_writer(cancel, |tx| {
            let mut applied = 0;
            for update in updates {
                let changed = tx.execute(
                    "UPDATE edges SET weight = ?4
                     WHERE source = ?1 AND target = ?2 AND kind = ?3",
                    params![
                        update.source,
                        update.target,
                        update.kind.as_str(),
                        clamp_weight(update.weight),
                    ],
                )?;
                if changed == 0 {
                    tracing::warn!(
                        source = %update.source,
                        target = %update.target,
                        kind = %update.kind,
                        "weight update for unknown edge skipped"
                    );
                } else {
                    applied += changed;
                }
            }
            Ok(applied)
        })
    }

    fn apply_hebbian_batch(
        &self,
        cancel: &CancellationToken,
        updates: &[EdgeWeightUpdate],
        candidates: &[CoActivationCandidate],
        gate: u32,
        window: Duration,
    ) -> Result<HebbianReport> {
        if updates.is_empty() && candidates.is_empty() {
            return Ok(HebbianReport::default());
        }
        self.with_writer(cancel, |tx| {
            let now = Utc::now();
            let mut report = HebbianReport::default();

            for update in updates {
                let changed = tx.execute(
                    "UPDATE edges SET weight = ?4
                     WHERE source = ?1 AND target = ?2 AND kind = ?3",
                    params![
                        update.source,
                        update.target,
                        update.kind.as_str(),
                        clamp_weight(update.weight),
                    ],
                )?;
                report.updated += changed;
            }

            for candidate in candidates {
                // Another session may have created the edge since pair
                // extraction; the counter then no longer applies.
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM edges
                         WHERE source = ?1 AND target = ?2 AND kind = ?3",
                        params![
                            candidate.source,
                            candidate.target,
                            EdgeKind::CoActivated.as_str()
                        ],
                        |r| r.get(0),
                    )
                    .optional()?;
                if exists.is_some() {
                    continue;
                }

                let key = pair_key(&candidate.source, &candidate.target);
                let row: Option<(u32, DateTime<Utc>)> = tx
                    .query_row(
                        "SELECT count, window_start FROM co_activation_counters
                         WHERE pair_key = ?1",
                        params![key],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()?;

                let count = match row {
                    Some((count, window_start)) if now - window_start <= window => {
                        let next = count + 1;
                        tx.execute(
                            "UPDATE co_activation_counters SET count = ?2
                             WHERE pair_key = ?1",
                            params![key, next],
                        )?;
                        next
                    }
                    Some(_) => {
                        // Window expired: restart the count
                        tx.execute(
                            "UPDATE co_activation_counters
                             SET count = 1, window_start = ?2 WHERE pair_key = ?1",
                            params![key, now],
                        )?;
                        1
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO co_activation_counters (pair_key, count, window_start)
                             VALUES (?1, 1, ?2)",
                            params![key, now],
                        )?;
                        1
                    }
                };

                if count >= gate {
                    let edge = GraphEdge {
                        source: candidate.source.clone(),
                        target: candidate.target.clone(),
                        kind: EdgeKind::CoActivated,
                        weight: clamp_weight(candidate.initial_weight),
                        created_at: now,
                        last_activated: Some(now),
                    };
                    insert_edge(tx, &edge)?;
                    report
                        .created
                        .push((candidate.source.clone(), candidate.target.clone()));
                } else {
                    report.pending += 1;
                }
            }

            Ok(report)
        })
    }

    fn co_activation_count(&self, cancel: &CancellationToken, pair_key: &str) -> Result<u32> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let count: Option<u32> = reader
            .query_row(
                "SELECT count FROM co_activation_counters WHERE pair_key = ?1",
                params![pair_key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    fn touch_edges(
        &self,
        cancel: &CancellationToken,
        node_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if node_ids.is_empty() {
            return Ok(0);
        }
        self.with_writer(cancel, |tx| {
            let mut touched = 0;
            for chunk in node_ids.chunks(200) {
                let placeholders: Vec<String> =
                    (1..=chunk.len()).map(|i| format!("?{}", i + 1)).collect();
                let list = placeholders.join(", ");
                let sql = format!(
                    "UPDATE edges SET last_activated = ?1
                     WHERE (source IN ({list}) OR target IN ({list}))
                       AND (last_activated IS NULL OR last_activated < ?1)"
                );
                let mut args: Vec<&dyn rusqlite::types::ToSql> = vec![&now];
                for id in chunk {
                    args.push(id);
                }
                touched += tx.execute(&sql, args.as_slice())?;
            }
            Ok(touched)
        })
    }

    fn record_activation_hit(
        &self,
        cancel: &CancellationToken,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_writer(cancel, |tx| {
            tx.execute(
                "UPDATE behaviors SET
                    times_activated = times_activated + 1,
                    updated_at = ?2,
                    last_activated = CASE
                        WHEN last_activated IS NULL OR last_activated < ?2 THEN ?2
                        ELSE last_activated
                    END
                 WHERE id = ?1",
                params![node_id, now],
            )?;
            Ok(())
        })
    }

    fn redirect_edges(&self, cancel: &CancellationToken, from: &str, to: &str) -> Result<usize> {
        if from == to {
            return Err(StoreError::Validation(
                "cannot redirect a node onto itself".to_string(),
            ));
        }
        self.with_writer(cancel, |tx| {
            let mut stmt = tx.prepare(
                "SELECT source, target, kind, weight, created_at, last_activated
                 FROM edges WHERE source = ?1 OR target = ?1",
            )?;
            let incident: Vec<GraphEdge> = stmt
                .query_map(params![from], edge_from_row)?
                .collect::<rusqlite::Result<_>>()?;
            drop(stmt);

            let mut moved = 0;
            for old in &incident {
                tx.execute(
                    "DELETE FROM edges WHERE source = ?1 AND target = ?2 AND kind = ?3",
                    params![old.source, old.target, old.kind.as_str()],
                )?;
                let mut edge = old.clone();
                if edge.source == from {
                    edge.source = to.to_string();
                }
                if edge.target == from {
                    edge.target = to.to_string();
                }
                if edge.is_self_loop() {
                    continue;
                }
                insert_edge(tx, &edge)?;
                moved += 1;
            }
            Ok(moved)
        })
    }

    fn save_correction(&self, cancel: &CancellationToken, correction: &Correction) -> Result<()> {
        let context_json = serde_json::to_string(&correction.context)
            .map_err(|e| StoreError::Validation(format!("context not serializable: {}", e)))?;
        self.with_writer(cancel, |tx| {
            tx.execute(
                "INSERT INTO corrections (
                    id, timestamp, context, agent_action, human_response,
                    corrected_action, conversation_id, turn, corrected_by, processed
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    processed = excluded.processed",
                params![
                    correction.id,
                    correction.timestamp,
                    context_json,
                    correction.agent_action,
                    correction.human_response,
                    correction.corrected_action,
                    correction.conversation_id,
                    correction.turn,
                    correction.corrected_by,
                    correction.processed,
                ],
            )?;
            Ok(())
        })
    }

    fn get_correction(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Correction>> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;
        let correction = reader
            .query_row(
                "SELECT id, timestamp, context, agent_action, human_response,
                        corrected_action, conversation_id, turn, corrected_by, processed
                 FROM corrections WHERE id = ?1",
                params![id],
                |row| {
                    let context_json: String = row.get(2)?;
                    Ok(Correction {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        context: serde_json::from_str(&context_json)
                            .map_err(|e| json_err(2, e))?,
                        agent_action: row.get(3)?,
                        human_response: row.get(4)?,
                        corrected_action: row.get(5)?,
                        conversation_id: row.get(6)?,
                        turn: row.get(7)?,
                        corrected_by: row.get(8)?,
                        processed: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(correction)
    }

    fn mark_correction_processed(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.with_writer(cancel, |tx| {
            tx.execute(
                "UPDATE corrections SET processed = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    fn export_graph(&self, cancel: &CancellationToken) -> Result<GraphDump> {
        Self::ensure_live(cancel)?;
        let reader = self.reader()?;

        let mut stmt =
            reader.prepare(&format!("SELECT {BEHAVIOR_COLUMNS} FROM behaviors ORDER BY id"))?;
        let nodes: Vec<Behavior> = stmt
            .query_map([], behavior_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut stmt = reader.prepare(
            "SELECT source, target, kind, weight, created_at, last_activated
             FROM edges ORDER BY source, target, kind",
        )?;
        let edges: Vec<GraphEdge> = stmt
            .query_map([], edge_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        Ok(GraphDump {
            version: crate::backup::BACKUP_VERSION,
            created_at: Utc::now(),
            nodes,
            edges,
        })
    }

    fn import_graph(&self, cancel: &CancellationToken, dump: &GraphDump) -> Result<()> {
        self.with_writer(cancel, |tx| {
            tx.execute("DELETE FROM edges", [])?;
            tx.execute("DELETE FROM behaviors", [])?;
            tx.execute("DELETE FROM co_activation_counters", [])?;
            for node in &dump.nodes {
                let b = normalized(node)?;
                insert_behavior(tx, &b)?;
            }
            for edge in &dump.edges {
                insert_edge(tx, edge)?;
            }
            Ok(())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
