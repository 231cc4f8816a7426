//! End-to-end exercise of the six literal scenarios against a real
//! temp-directory archive and lattice pair.

use chrono::Utc;
use lmtlss_core::archive::ArchiveStore;
use lmtlss_core::circulation::{run, CirculationContext};
use lmtlss_core::config::Config;
use lmtlss_core::error::{ArchiveError, CirculationError};
use lmtlss_core::lattice::LatticeStore;
use std::sync::atomic::{AtomicU64, Ordering};

fn temp_dir(label: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("lmtlss-integration-test-{label}-{id}"))
}

fn context() -> CirculationContext {
    CirculationContext {
        agent_id: "agent-1".into(),
        channel: Some("cli".into()),
        peer: Some("author".into()),
        model: None,
        session_key: None,
    }
}

#[test]
fn scenario_1_empty_cycle() {
    let dir = temp_dir("scenario-1");
    let mut archive = ArchiveStore::open(&dir).unwrap();
    let lattice = LatticeStore::open(&dir).unwrap();
    let config = Config::default();

    let reply = "Hello! <lattice_update>{\"add\":[{\"premise\":\"Author says hello\",\"nodeType\":\"premise\",\"weight\":{}}]}</lattice_update>";
    let result = run(&mut archive, &lattice, &config, "Hello world", &context(), Utc::now(), |_| Ok(reply.to_string())).unwrap();

    assert_eq!(result.reply, "Hello!");
    assert_eq!(archive.event_count().unwrap(), 3);
    let added = result.proposal.expect("proposal should compile").added_node_ids;
    assert_eq!(added.len(), 1);
    let node = lattice.get_node(&added[0]).unwrap().unwrap();
    assert_eq!(node.premise, "Author says hello");
    assert!((node.weight.salience).abs() < 1e-9);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_2_malformed_proposal() {
    let dir = temp_dir("scenario-2");
    let mut archive = ArchiveStore::open(&dir).unwrap();
    let lattice = LatticeStore::open(&dir).unwrap();
    let config = Config::default();

    let reply = "Ok. <lattice_update>{ invalid json </lattice_update>";
    let result = run(&mut archive, &lattice, &config, "Hello world", &context(), Utc::now(), |_| Ok(reply.to_string())).unwrap();

    assert!(result.reply.contains("Ok."));
    assert_eq!(archive.event_count().unwrap(), 3);
    assert_eq!(lattice.node_count().unwrap(), 0);
    assert!(result.proposal.is_none());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_3_hash_chain() {
    let dir = temp_dir("scenario-3");
    let mut archive = ArchiveStore::open(&dir).unwrap();

    let e1 = archive
        .append_event(None, Utc::now(), "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAV", "system_event", "agent-1", None, None, None, serde_json::json!({"msg": 1}))
        .unwrap();
    let e2 = archive
        .append_event(Some(&e1.event_hash), Utc::now(), "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAV", "system_event", "agent-1", None, None, None, serde_json::json!({"msg": 2}))
        .unwrap();

    assert_ne!(e1.event_hash, e2.event_hash);
    let fetched = archive.get_by_hash(&e2.event_hash).unwrap().unwrap();
    assert_eq!(fetched.parent_hash.as_deref(), Some(e1.event_hash.as_str()));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_4_world_action_gating() {
    let dir = temp_dir("scenario-4");
    let mut archive = ArchiveStore::open(&dir).unwrap();

    let unapproved = archive.append_event(
        None,
        Utc::now(),
        "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAV",
        "world_action",
        "agent-1",
        None,
        None,
        None,
        serde_json::json!({"action": "deploy"}),
    );
    assert!(matches!(unapproved, Err(ArchiveError::WorldActionNotApproved)));

    let approved = archive.append_event(
        None,
        Utc::now(),
        "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAV",
        "world_action",
        "agent-1",
        None,
        None,
        None,
        serde_json::json!({"action": "deploy", "approvalId": "appr_123", "approved": true}),
    );
    assert!(approved.is_ok());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_5_promotion() {
    use lmtlss_core::cron::run_maintenance;
    use lmtlss_core::lattice::{NodeStatus, NodeType, WeightVector};

    let dir = temp_dir("scenario-5");
    let mut archive = ArchiveStore::open(&dir).unwrap();
    let lattice = LatticeStore::open(&dir).unwrap();
    let config = Config::default();
    let now = Utc::now();

    let eligible = lattice
        .create_node(NodeType::Premise, "eligible", NodeStatus::Provisional, "agent-1", WeightVector::new(0.0, 0.0, 0.0, 0.8, 0.2, 0.0), None, None, now)
        .unwrap();
    let ineligible = lattice
        .create_node(NodeType::Premise, "ineligible", NodeStatus::Provisional, "agent-1", WeightVector::new(0.0, 0.0, 0.0, 0.5, 0.2, 0.0), None, None, now)
        .unwrap();

    run_maintenance(&mut archive, &lattice, &config.decay, &config.capsule, now, None).unwrap();

    assert_eq!(lattice.get_node(&eligible.node_id).unwrap().unwrap().status, NodeStatus::Active);
    assert_eq!(lattice.get_node(&ineligible.node_id).unwrap().unwrap().status, NodeStatus::Provisional);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_6_recall_merging() {
    use lmtlss_core::lattice::{LinkType, NodeStatus, NodeType, WeightVector};
    use lmtlss_core::recall::{recall, RecallOptions};

    let dir = temp_dir("scenario-6");
    let mut archive = ArchiveStore::open(&dir).unwrap();
    let lattice = LatticeStore::open(&dir).unwrap();

    let x = archive
        .append_event(
            None,
            Utc::now() - chrono::Duration::hours(5),
            "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "author_message",
            "agent-1",
            None,
            None,
            None,
            serde_json::json!({"text": "the secret launch code is persimmon"}),
        )
        .unwrap();
    let node = lattice
        .create_node(NodeType::Premise, "the secret launch code is persimmon", NodeStatus::Active, "agent-1", WeightVector::default(), None, None, Utc::now())
        .unwrap();
    lattice.add_evidence(&node.node_id, &x.event_hash, LinkType::Origin).unwrap();

    let mut parent = None;
    let mut recent_hashes = Vec::new();
    for i in 0..2 {
        let ev = archive
            .append_event(
                parent.as_deref(),
                Utc::now(),
                "lmtlss:agent-1:01ARZ3NDEKTSV4RRFFQ69G5FAW",
                "author_message",
                "agent-1",
                None,
                None,
                None,
                serde_json::json!({"text": format!("recent {i}")}),
            )
            .unwrap();
        parent = Some(ev.event_hash.clone());
        recent_hashes.push(ev.event_hash);
    }

    let options = RecallOptions {
        recent_count: 2,
        semantic_count: 1,
        time_range: None,
        agent_id: None,
    };
    let result = recall(&archive, &lattice, "secret", &options).unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].event_hash, x.event_hash);
    assert!(result[1].timestamp <= result[2].timestamp);
    let hashes: Vec<&str> = result.iter().map(|e| e.event_hash.as_str()).collect();
    let unique: std::collections::HashSet<&str> = hashes.iter().copied().collect();
    assert_eq!(hashes.len(), unique.len());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn model_failure_propagates_and_is_recorded() {
    let dir = temp_dir("model-failure-integration");
    let mut archive = ArchiveStore::open(&dir).unwrap();
    let lattice = LatticeStore::open(&dir).unwrap();
    let config = Config::default();

    let err = run(&mut archive, &lattice, &config, "hi", &context(), Utc::now(), |_| {
        Err(CirculationError::ModelFailed { reason: "network down".into() })
    })
    .unwrap_err();

    assert!(matches!(err, CirculationError::ModelFailed { .. }));
    let recent = archive.get_recent(1).unwrap();
    assert_eq!(recent[0].event_type, "system_event");
    assert_eq!(recent[0].payload["action"], "circulation_aborted");
    let _ = std::fs::remove_dir_all(&dir);
}
