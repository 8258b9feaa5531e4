//! Backup and restore
//!
//! On-disk format (v2): one plain-text JSON header line carrying counts and
//! a `sha256:<hex>` checksum, then an LF, then the gzip-compressed JSON
//! payload of the full graph. The checksum covers the compressed bytes, so
//! any payload mutation is caught before decompression. Legacy v1 backups
//! are a single line of plain JSON and are detected by probing the first
//! line.
//!
//! Restores are bounded (source and decompressed size), refuse paths
//! outside the allow-list, and import through one store transaction —
//! a failed restore leaves the store untouched.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::store::{GraphDump, GraphStore, StoreError};

/// Current backup format version
pub const BACKUP_VERSION: u32 = 2;

/// Largest backup file a restore will read
pub const MAX_BACKUP_BYTES: u64 = 50 * 1024 * 1024;

/// Largest decompressed payload a restore will accept
pub const MAX_RESTORE_BYTES: u64 = 200 * 1024 * 1024;

// ============================================================================
// ERRORS
// ============================================================================

/// Backup/restore error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed header or payload JSON
    #[error("Malformed backup: {0}")]
    Json(#[from] serde_json::Error),
    /// Checksum mismatch, size bound exceeded, count mismatch
    #[error("Integrity check failed: {0}")]
    Integrity(String),
    /// Path not under any allowed prefix
    #[error("Path not allowed: {0}")]
    PathNotAllowed(PathBuf),
    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Backup result type
pub type Result<T> = std::result::Result<T, BackupError>;

// ============================================================================
// FORMAT
// ============================================================================

/// The plain-text header line of a v2 backup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupHeader {
    /// Format version
    pub version: u32,
    /// When the backup was taken
    pub created_at: DateTime<Utc>,
    /// `sha256:<hex>` over the compressed payload bytes
    pub checksum: String,
    /// Behaviors in the payload
    pub node_count: usize,
    /// Edges in the payload
    pub edge_count: usize,
    /// Whether the payload is gzip-compressed
    pub compressed: bool,
}

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    /// Format version that was read
    pub version: u32,
    /// Behaviors imported
    pub nodes: usize,
    /// Edges imported
    pub edges: usize,
}

/// Paths backups may be written to and read from
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// A path is legal when it starts with one of these prefixes
    pub allowed_prefixes: Vec<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec![std::env::temp_dir()],
        }
    }
}

impl BackupConfig {
    /// Config allowing exactly the given prefixes
    pub fn with_prefixes<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            allowed_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn check_path(&self, path: &Path) -> Result<()> {
        if self
            .allowed_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            Ok(())
        } else {
            Err(BackupError::PathNotAllowed(path.to_path_buf()))
        }
    }
}

fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sha256:{}", hex)
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }
    Ok(())
}

// ============================================================================
// MANAGER
// ============================================================================

/// Writes and restores graph backups
pub struct BackupManager {
    store: Arc<dyn GraphStore>,
    config: BackupConfig,
}

impl BackupManager {
    /// Manager over a store with the given path policy
    pub fn new(store: Arc<dyn GraphStore>, config: BackupConfig) -> Self {
        Self { store, config }
    }

    /// Write a v2 backup of the full graph to `path`.
    ///
    /// Parent directories are created 0o700; the backup file is 0o600.
    pub fn backup_to(&self, cancel: &CancellationToken, path: &Path) -> Result<BackupHeader> {
        ensure_live(cancel)?;
        self.config.check_path(path)?;

        let dump = self.store.export_graph(cancel)?;
        let payload = serde_json::to_vec(&dump)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        let compressed = encoder.finish()?;

        let header = BackupHeader {
            version: BACKUP_VERSION,
            created_at: dump.created_at,
            checksum: checksum_hex(&compressed),
            node_count: dump.nodes.len(),
            edge_count: dump.edges.len(),
            compressed: true,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }

        ensure_live(cancel)?;
        let mut file = std::fs::File::create(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        file.write_all(serde_json::to_string(&header)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.write_all(&compressed)?;
        file.flush()?;

        tracing::info!(
            path = %path.display(),
            nodes = header.node_count,
            edges = header.edge_count,
            "backup written"
        );
        Ok(header)
    }

    /// Restore the graph from `path`, replacing current contents.
    ///
    /// The checksum is verified before anything is decompressed or
    /// imported; a failure at any point leaves the store unchanged.
    pub fn restore_from(&self, cancel: &CancellationToken, path: &Path) -> Result<RestoreReport> {
        ensure_live(cancel)?;
        self.config.check_path(path)?;

        let size = std::fs::metadata(path)?.len();
        if size > MAX_BACKUP_BYTES {
            return Err(BackupError::Integrity(format!(
                "backup file is {} bytes, limit is {}",
                size, MAX_BACKUP_BYTES
            )));
        }

        let raw = std::fs::read(path)?;
        let dump = match split_header(&raw) {
            Some((header_line, body)) => {
                let header: BackupHeader = serde_json::from_slice(header_line)?;
                self.read_v2(&header, body)?
            }
            None => read_legacy(&raw)?,
        };

        let report = RestoreReport {
            version: dump.version,
            nodes: dump.nodes.len(),
            edges: dump.edges.len(),
        };
        self.store.import_graph(cancel, &dump)?;

        tracing::info!(
            path = %path.display(),
            nodes = report.nodes,
            edges = report.edges,
            "backup restored"
        );
        Ok(report)
    }

    fn read_v2(&self, header: &BackupHeader, compressed: &[u8]) -> Result<GraphDump> {
        let checksum = checksum_hex(compressed);
        if checksum != header.checksum {
            return Err(BackupError::Integrity(format!(
                "checksum mismatch: header {}, payload {}",
                header.checksum, checksum
            )));
        }

        let mut decoder = GzDecoder::new(compressed).take(MAX_RESTORE_BYTES + 1);
        let mut payload = Vec::new();
        decoder.read_to_end(&mut payload)?;
        if payload.len() as u64 > MAX_RESTORE_BYTES {
            return Err(BackupError::Integrity(format!(
                "decompressed payload exceeds {} bytes",
                MAX_RESTORE_BYTES
            )));
        }

        let dump: GraphDump = serde_json::from_slice(&payload)?;
        if dump.nodes.len() != header.node_count || dump.edges.len() != header.edge_count {
            return Err(BackupError::Integrity(format!(
                "header counts ({} nodes, {} edges) disagree with payload ({} nodes, {} edges)",
                header.node_count,
                header.edge_count,
                dump.nodes.len(),
                dump.edges.len()
            )));
        }
        Ok(dump)
    }
}

/// A v2 file starts with a JSON header line containing `"compressed"`.
/// Returns (header line, body after the LF) when the probe succeeds.
fn split_header(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let newline = raw.iter().position(|&b| b == b'\n')?;
    let (line, rest) = raw.split_at(newline);
    if !line.starts_with(b"{") {
        return None;
    }
    let probe: serde_json::Result<serde_json::Value> = serde_json::from_slice(line);
    match probe {
        Ok(value) if value.get("compressed").is_some() => Some((line, &rest[1..])),
        _ => None,
    }
}

/// Legacy v1: the whole file is one line of plain JSON
fn read_legacy(raw: &[u8]) -> Result<GraphDump> {
    if !raw.starts_with(b"{") {
        return Err(BackupError::Integrity(
            "unrecognized backup format".to_string(),
        ));
    }
    let dump: GraphDump = serde_json::from_slice(raw)?;
    Ok(dump)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Behavior, EdgeKind, GraphEdge};
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn setup() -> (BackupManager, Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(Some(dir.path().join("test.db"))).unwrap());
        let config = BackupConfig::with_prefixes([dir.path().to_path_buf()]);
        (BackupManager::new(store.clone(), config), store, dir)
    }

    fn populate(store: &SqliteStore) -> (Behavior, Behavior) {
        let cancel = CancellationToken::new();
        let a = Behavior::new(Behavior::id_for("a", "a"), "learned/a", "rule a");
        let b = Behavior::new(Behavior::id_for("b", "b"), "learned/b", "rule b");
        store.add_behavior(&cancel, &a).unwrap();
        store.add_behavior(&cancel, &b).unwrap();
        store
            .add_edge(&cancel, &GraphEdge::new(&a.id, &b.id, EdgeKind::SimilarTo, 0.6))
            .unwrap();
        (a, b)
    }

    #[test]
    fn test_backup_roundtrip() {
        let (manager, store, dir) = setup();
        let cancel = CancellationToken::new();
        populate(&store);

        let path = dir.path().join("backups/graph.backup");
        let header = manager.backup_to(&cancel, &path).unwrap();
        assert_eq!(header.version, BACKUP_VERSION);
        assert_eq!(header.node_count, 2);
        assert_eq!(header.edge_count, 1);
        assert!(header.checksum.starts_with("sha256:"));

        let before = store.export_graph(&cancel).unwrap();

        // Restore into a fresh store
        let dir2 = TempDir::new().unwrap();
        let store2 = Arc::new(SqliteStore::new(Some(dir2.path().join("other.db"))).unwrap());
        let manager2 = BackupManager::new(
            store2.clone(),
            BackupConfig::with_prefixes([dir.path().to_path_buf()]),
        );
        let report = manager2.restore_from(&cancel, &path).unwrap();
        assert_eq!(report.nodes, 2);
        assert_eq!(report.edges, 1);

        let after = store2.export_graph(&cancel).unwrap();
        assert_eq!(before.nodes, after.nodes);
        assert_eq!(before.edges, after.edges);
    }

    #[test]
    fn test_single_byte_mutation_rejected() {
        let (manager, store, dir) = setup();
        let cancel = CancellationToken::new();
        populate(&store);

        let path = dir.path().join("graph.backup");
        manager.backup_to(&cancel, &path).unwrap();

        // Flip one byte of the compressed payload
        let mut raw = std::fs::read(&path).unwrap();
        let newline = raw.iter().position(|&b| b == b'\n').unwrap();
        let target = newline + 1 + (raw.len() - newline) / 2;
        raw[target] ^= 0x01;
        std::fs::write(&path, &raw).unwrap();

        match manager.restore_from(&cancel, &path) {
            Err(BackupError::Integrity(msg)) => assert!(msg.contains("checksum")),
            other => panic!("expected integrity failure, got {:?}", other),
        }

        // Store untouched by the failed restore
        assert_eq!(store.count_behaviors(&cancel).unwrap(), 2);
    }

    #[test]
    fn test_legacy_v1_detected() {
        let (manager, store, dir) = setup();
        let cancel = CancellationToken::new();

        let dump = GraphDump {
            version: 1,
            created_at: Utc::now(),
            nodes: vec![Behavior::new(
                Behavior::id_for("legacy", "legacy"),
                "learned/legacy",
                "legacy rule",
            )],
            edges: vec![],
        };
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, serde_json::to_string(&dump).unwrap()).unwrap();

        let report = manager.restore_from(&cancel, &path).unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(report.nodes, 1);
        assert_eq!(store.count_behaviors(&cancel).unwrap(), 1);
    }

    #[test]
    fn test_path_outside_allowlist_refused() {
        let (manager, _store, _dir) = setup();
        let cancel = CancellationToken::new();
        let outside = PathBuf::from("/somewhere/else/backup.json");
        assert!(matches!(
            manager.backup_to(&cancel, &outside),
            Err(BackupError::PathNotAllowed(_))
        ));
        assert!(matches!(
            manager.restore_from(&cancel, &outside),
            Err(BackupError::PathNotAllowed(_))
        ));
    }

    #[test]
    fn test_header_count_mismatch_rejected() {
        let (manager, store, dir) = setup();
        let cancel = CancellationToken::new();
        populate(&store);

        let path = dir.path().join("graph.backup");
        manager.backup_to(&cancel, &path).unwrap();

        // Rewrite the header with a wrong node count but a fixed checksum
        let raw = std::fs::read(&path).unwrap();
        let newline = raw.iter().position(|&b| b == b'\n').unwrap();
        let mut header: BackupHeader = serde_json::from_slice(&raw[..newline]).unwrap();
        header.node_count = 99;
        let mut rewritten = serde_json::to_vec(&header).unwrap();
        rewritten.push(b'\n');
        rewritten.extend_from_slice(&raw[newline + 1..]);
        std::fs::write(&path, &rewritten).unwrap();

        match manager.restore_from(&cancel, &path) {
            Err(BackupError::Integrity(msg)) => assert!(msg.contains("disagree")),
            other => panic!("expected integrity failure, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        let (manager, _store, dir) = setup();
        let cancel = CancellationToken::new();
        let path = dir.path().join("garbage.backup");
        std::fs::write(&path, b"this is not a backup at all").unwrap();
        assert!(manager.restore_from(&cancel, &path).is_err());
    }

    #[test]
    fn test_cancelled_restore_leaves_store() {
        let (manager, store, dir) = setup();
        let cancel = CancellationToken::new();
        populate(&store);
        let path = dir.path().join("graph.backup");
        manager.backup_to(&cancel, &path).unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(
            manager.restore_from(&cancelled, &path),
            Err(BackupError::Cancelled)
        ));
        assert_eq!(store.count_behaviors(&cancel).unwrap(), 2);
    }
}
