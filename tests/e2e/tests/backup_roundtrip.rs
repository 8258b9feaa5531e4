//! Backup format, integrity, and roundtrip fidelity

use tokio_util::sync::CancellationToken;

use engram_core::{
    BackupConfig, BackupError, BackupManager, EdgeKind, GraphStore, SqliteStore, WhenPredicate,
    WhenValue,
};
use engram_e2e_tests::harness::{add, behavior, link, scoped_behavior, temp_store};

fn populate(store: &SqliteStore) {
    let mut a = scoped_behavior(
        "backup-a",
        WhenPredicate::new().with("language", WhenValue::scalar("python")),
    );
    a.content.set_tags(["python", "testing"]);
    a.confidence = 0.85;
    let b = behavior("backup-b");
    let c = behavior("backup-c");
    add(store, &a);
    add(store, &b);
    add(store, &c);
    link(store, &a.id, &b.id, EdgeKind::Overrides, 0.7);
    link(store, &b.id, &c.id, EdgeKind::CoActivated, 0.2);
}

#[test]
fn roundtrip_preserves_graph_exactly() {
    let (source, dir) = temp_store();
    let cancel = CancellationToken::new();
    populate(&source);

    let config = BackupConfig::with_prefixes([dir.path().to_path_buf()]);
    let manager = BackupManager::new(source.clone(), config.clone());
    let path = dir.path().join("graph.backup");
    let header = manager.backup_to(&cancel, &path).unwrap();
    assert_eq!(header.node_count, 3);
    assert_eq!(header.edge_count, 2);
    assert!(header.compressed);
    assert!(header.checksum.starts_with("sha256:"));

    let (target, _dir2) = temp_store();
    let restorer = BackupManager::new(target.clone(), config);
    let report = restorer.restore_from(&cancel, &path).unwrap();
    assert_eq!(report.nodes, 3);
    assert_eq!(report.edges, 2);

    // Graph identical modulo ordering (export orders by id)
    let before = source.export_graph(&cancel).unwrap();
    let after = target.export_graph(&cancel).unwrap();
    assert_eq!(before.nodes, after.nodes);
    assert_eq!(before.edges, after.edges);
}

#[test]
fn restore_replaces_existing_contents() {
    let (source, dir) = temp_store();
    let cancel = CancellationToken::new();
    populate(&source);

    let config = BackupConfig::with_prefixes([dir.path().to_path_buf()]);
    let path = dir.path().join("graph.backup");
    BackupManager::new(source, config.clone())
        .backup_to(&cancel, &path)
        .unwrap();

    let (target, _dir2) = temp_store();
    add(&target, &behavior("pre-existing"));
    BackupManager::new(target.clone(), config)
        .restore_from(&cancel, &path)
        .unwrap();

    assert_eq!(target.count_behaviors(&cancel).unwrap(), 3);
    assert!(target
        .get_behavior(&cancel, &behavior("pre-existing").id)
        .unwrap()
        .is_none());
}

#[test]
fn every_single_byte_mutation_of_the_payload_is_rejected() {
    let (source, dir) = temp_store();
    let cancel = CancellationToken::new();
    populate(&source);

    let config = BackupConfig::with_prefixes([dir.path().to_path_buf()]);
    let manager = BackupManager::new(source, config.clone());
    let path = dir.path().join("graph.backup");
    manager.backup_to(&cancel, &path).unwrap();

    let pristine = std::fs::read(&path).unwrap();
    let newline = pristine.iter().position(|&b| b == b'\n').unwrap();
    let body_start = newline + 1;

    // Walk a sample of payload offsets; every flip must fail the checksum
    let body_len = pristine.len() - body_start;
    let step = (body_len / 16).max(1);
    for offset in (0..body_len).step_by(step) {
        let mut mutated = pristine.clone();
        mutated[body_start + offset] ^= 0x01;
        let mutated_path = dir.path().join(format!("mutated-{offset}.backup"));
        std::fs::write(&mutated_path, &mutated).unwrap();

        let (target, _dir2) = temp_store();
        let result = BackupManager::new(target, config.clone())
            .restore_from(&cancel, &mutated_path);
        assert!(
            matches!(result, Err(BackupError::Integrity(_))),
            "flip at payload offset {offset} must be caught"
        );
    }
}

#[test]
fn oversized_backup_refused() {
    let (store, dir) = temp_store();
    let cancel = CancellationToken::new();
    let config = BackupConfig::with_prefixes([dir.path().to_path_buf()]);
    let manager = BackupManager::new(store, config);

    // A file over the source bound is refused before parsing
    let path = dir.path().join("huge.backup");
    let chunk = vec![b'x'; 1024 * 1024];
    let mut file = std::fs::File::create(&path).unwrap();
    use std::io::Write;
    for _ in 0..51 {
        file.write_all(&chunk).unwrap();
    }
    drop(file);

    assert!(matches!(
        manager.restore_from(&cancel, &path),
        Err(BackupError::Integrity(_))
    ));
}
