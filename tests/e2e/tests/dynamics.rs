//! Long-run numeric dynamics
//!
//! Multi-session runs exercising the coupled spreading + Hebbian system:
//! weight stability under repetition, gated edge creation, the inhibition
//! cliff, and temporal decay of edge influence.
//!
//! The graph fixtures fan a seeded hub out over several neighbors; with
//! per-node normalization the spread activations land well under the
//! default pairing threshold, so the Hebbian configs here set the
//! threshold to a value calibrated for the fixture density.

use chrono::{Duration, Utc};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use engram_core::{
    extract_pairs, pair_key, ActivationConfig, EdgeKind, GraphEdge, GraphStore, HebbianConfig,
    HebbianLearner, InhibitionConfig, SpreadingEngine,
};
use engram_e2e_tests::harness::{add, behavior, link, seed, temp_store, variance};

/// Insert a co-activated edge in canonical id order
fn co_link(store: &engram_core::SqliteStore, x: &str, y: &str, weight: f64) {
    let (source, target) = if x <= y { (x, y) } else { (y, x) };
    link(store, source, target, EdgeKind::CoActivated, weight);
}

fn co_edge(
    store: &engram_core::SqliteStore,
    cancel: &CancellationToken,
    x: &str,
    y: &str,
) -> Option<GraphEdge> {
    let (source, target) = if x <= y { (x, y) } else { (y, x) };
    store
        .get_edge(cancel, source, target, EdgeKind::CoActivated)
        .unwrap()
}

#[test]
fn repeated_sessions_keep_weights_stable() {
    // Hub a fans out to b, c, d over strong edges; b/c/d carry pre-existing
    // co-activated links at 0.3. Fifty learning sessions must move the
    // weights upward without ever escaping the legal range, settling into a
    // low-variance steady state.
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let a = behavior("dyn-a");
    let b = behavior("dyn-b");
    let c = behavior("dyn-c");
    let d = behavior("dyn-d");
    let e = behavior("dyn-e"); // disconnected bystander
    for node in [&a, &b, &c, &d, &e] {
        add(&store, node);
    }
    for spoke in [&b, &c, &d] {
        link(&store, &a.id, &spoke.id, EdgeKind::SimilarTo, 0.9);
    }
    co_link(&store, &b.id, &c.id, 0.3);
    co_link(&store, &b.id, &d.id, 0.3);
    co_link(&store, &c.id, &d.id, 0.3);

    let activation_cfg = ActivationConfig {
        inhibition: InhibitionConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let hebbian_cfg = HebbianConfig {
        activation_threshold: 0.05,
        ..Default::default()
    };
    let engine = SpreadingEngine::new(store.clone(), activation_cfg);
    let learner = HebbianLearner::new(store.clone(), hebbian_cfg.clone());
    let seeds = vec![seed(&a.id, 0.8)];
    let seed_ids: HashSet<String> = seeds.iter().map(|s| s.id.clone()).collect();

    let tracked = [(&b.id, &c.id), (&b.id, &d.id), (&c.id, &d.id)];
    let mut histories: Vec<Vec<f64>> = vec![Vec::new(); tracked.len()];

    for _session in 0..50 {
        let results = engine.activate(&cancel, &seeds).unwrap();
        let pairs = extract_pairs(&results, &seed_ids, &hebbian_cfg);
        assert!(!pairs.is_empty(), "fixture must produce co-activation pairs");
        learner.apply(&cancel, &pairs, false).unwrap();

        for (slot, (x, y)) in tracked.iter().enumerate() {
            let edge = co_edge(&store, &cancel, x, y).expect("tracked edge exists");
            histories[slot].push(edge.weight);
        }
    }

    for history in &histories {
        assert!(history.iter().all(|w| (0.3..=0.95).contains(w)));
        // Repetition strengthens
        assert!(history.last().unwrap() > history.first().unwrap());
        // Steady state: the last 10 sessions barely move
        let tail = &history[history.len() - 10..];
        assert!(variance(tail) < 0.01);
    }

    // The bystander never gained edges
    let cancel2 = CancellationToken::new();
    assert!(store
        .get_edges(&cancel2, &e.id, engram_core::Direction::Both, None)
        .unwrap()
        .is_empty());
}

#[test]
fn creation_gate_opens_on_third_co_activation() {
    // No co-activated edges exist at the start. The (b, c) pair must fail
    // to wire on sessions 0 and 1, wire at minimum weight on session 2, and
    // strengthen by session 9.
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let hub = behavior("gate-hub");
    let b = behavior("gate-b");
    let c = behavior("gate-c");
    let d = behavior("gate-d");
    for node in [&hub, &b, &c, &d] {
        add(&store, node);
    }
    for spoke in [&b, &c, &d] {
        link(&store, &hub.id, &spoke.id, EdgeKind::SimilarTo, 0.9);
    }

    let hebbian_cfg = HebbianConfig {
        activation_threshold: 0.05,
        ..Default::default()
    };
    assert_eq!(hebbian_cfg.creation_gate, 3);

    let engine = SpreadingEngine::new(store.clone(), ActivationConfig::default());
    let learner = HebbianLearner::new(store.clone(), hebbian_cfg.clone());
    let seeds = vec![seed(&hub.id, 0.8)];
    let seed_ids: HashSet<String> = seeds.iter().map(|s| s.id.clone()).collect();

    let mut creation_weight = None;
    for session in 0..10 {
        let results = engine.activate(&cancel, &seeds).unwrap();
        let pairs = extract_pairs(&results, &seed_ids, &hebbian_cfg);
        learner.apply(&cancel, &pairs, true).unwrap();

        let edge = co_edge(&store, &cancel, &b.id, &c.id);
        match session {
            0 | 1 => assert!(edge.is_none(), "gate must hold through session {session}"),
            2 => {
                let edge = edge.expect("edge created on third co-activation");
                // Created at minimum weight, then immediately Oja-stepped
                assert!(edge.weight < 0.02);
                creation_weight = Some(edge.weight);

                let count = store
                    .co_activation_count(&cancel, &pair_key(&b.id, &c.id))
                    .unwrap();
                assert!(count >= 3);
            }
            _ => assert!(edge.is_some()),
        }
    }

    let final_weight = co_edge(&store, &cancel, &b.id, &c.id).unwrap().weight;
    assert!(
        final_weight > creation_weight.unwrap() + 1e-4,
        "continued co-activation must strengthen the new edge"
    );
}

#[test]
fn inhibition_produces_a_cliff_at_the_breadth_boundary() {
    // Hub with 11 neighbors in three strength bands. With breadth 7, the
    // drop between the last winner and the first loser must dominate every
    // other adjacent gap in the neighbor ranking.
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let hub = behavior("cliff-hub");
    add(&store, &hub);
    let mut neighbors = Vec::new();
    let bands = [(4, 0.9), (3, 0.6), (4, 0.2)];
    let mut index = 0;
    for (count, weight) in bands {
        for _ in 0..count {
            let node = behavior(&format!("cliff-n{:02}", index));
            add(&store, &node);
            link(&store, &hub.id, &node.id, EdgeKind::SimilarTo, weight);
            neighbors.push(node.id.clone());
            index += 1;
        }
    }

    let engine = SpreadingEngine::new(store, ActivationConfig::default());
    let results = engine
        .activate(&cancel, &[seed(&hub.id, 0.8)])
        .unwrap();

    // Results come back sorted descending; keep neighbors only
    let ranked: Vec<f64> = results
        .iter()
        .filter(|r| r.id != hub.id)
        .map(|r| r.activation)
        .collect();
    assert_eq!(ranked.len(), 11);

    let drops: Vec<f64> = ranked.windows(2).map(|w| w[0] - w[1]).collect();
    // Winners: hub + 4 strong + 2 medium = breadth 7, so the cliff falls
    // between neighbor ranks 6 and 7 (positions 5 and 6 here).
    let cliff = drops[5];
    for (i, drop) in drops.iter().enumerate() {
        if i != 5 {
            assert!(
                cliff > *drop,
                "cliff {cliff} must exceed adjacent gap {drop} at position {i}"
            );
        }
    }
}

#[test]
fn temporal_decay_fades_and_recovers_influence() {
    // Equal-weight edges to b and c. Backdating (a, b)'s last activation by
    // 48h weakens b's activation; restoring the timestamp brings it back.
    // The stored weight never changes.
    let (store, _dir) = temp_store();
    let cancel = CancellationToken::new();

    let a = behavior("decay-a");
    let b = behavior("decay-b");
    let c = behavior("decay-c");
    for node in [&a, &b, &c] {
        add(&store, node);
    }

    let now = Utc::now();
    let fresh = |target: &str| GraphEdge {
        last_activated: Some(now),
        ..GraphEdge::new(&a.id, target, EdgeKind::SimilarTo, 0.5)
    };
    store.add_edge(&cancel, &fresh(&b.id)).unwrap();
    store.add_edge(&cancel, &fresh(&c.id)).unwrap();

    let config = ActivationConfig {
        inhibition: InhibitionConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = SpreadingEngine::new(store.clone(), config);
    let seeds = [seed(&a.id, 0.8)];

    let activation_of = |results: &[engram_core::ActivationResult], id: &str| {
        results
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.activation)
            .expect("node activated")
    };

    let session1 = engine.activate(&cancel, &seeds).unwrap();
    let b1 = activation_of(&session1, &b.id);
    let c1 = activation_of(&session1, &c.id);
    assert!((b1 - c1).abs() < 1e-9, "fresh edges spread equally");

    // Backdate (a, b) by 48 hours
    let mut stale = fresh(&b.id);
    stale.last_activated = Some(now - Duration::hours(48));
    store.add_edge(&cancel, &stale).unwrap();

    let session2 = engine.activate(&cancel, &seeds).unwrap();
    let b2 = activation_of(&session2, &b.id);
    let c2 = activation_of(&session2, &c.id);
    assert!(b2 < b1 - 1e-6, "dormant edge must lose influence");
    assert!((c2 - c1).abs() < 1e-3, "untouched edge is unaffected");

    // Stored weight untouched by decay
    let stored = store
        .get_edge(&cancel, &a.id, &b.id, EdgeKind::SimilarTo)
        .unwrap()
        .unwrap();
    assert!((stored.weight - 0.5).abs() < 1e-12);

    // Restore the timestamp: influence comes back
    store.add_edge(&cancel, &fresh(&b.id)).unwrap();
    let session3 = engine.activate(&cancel, &seeds).unwrap();
    let b3 = activation_of(&session3, &b.id);
    assert!((b3 - b1).abs() < 1e-3, "recovered edge regains influence");
}
