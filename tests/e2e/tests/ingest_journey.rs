//! Exercises C10 end to end through the orchestrator's `ingest_envelope`
//! entry point: a paired peer submits a signed, encrypted capsule, it
//! lands in the store, and the durable consensus root still matches a
//! from-scratch recomputation afterward.

use cerebrum_core::ingest::IngestResult;
use cerebrum_core::llm::MockLlmAdapter;
use cerebrum_core::orchestrator::Orchestrator;
use cerebrum_core::store::Store;
use cerebrum_core::{Config, CoreEvent};
use cerebrum_e2e_tests::TestPeer;
use std::sync::Arc;

fn fresh_orchestrator() -> (Arc<Orchestrator>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.store_dir = dir.path().to_path_buf();
    let store = Arc::new(Store::open(&config.vector_store_dir()).unwrap());
    let orchestrator = Orchestrator::new(config, store, Arc::new(MockLlmAdapter));
    (orchestrator, dir)
}

#[test]
fn allowlisted_peer_capsule_is_ingested_and_searchable() {
    let (orchestrator, _dir) = fresh_orchestrator();
    let peer = TestPeer::new("peer-a");
    orchestrator.register_peer("peer-a", peer.signing_key.verifying_key(), peer.aes_key);
    orchestrator.allow_corroboration_source("peer-a");

    let envelope = peer.build_envelope("cap-1", "DeepWork", "user tends to focus best right after lunch", 0.9);
    let rx = orchestrator.subscribe();
    let report = orchestrator.ingest_envelope(&envelope, "peer-a");

    assert_eq!(report.result, IngestResult::Success);
    assert_eq!(report.capsule_id.as_deref(), Some("cap-1"));

    let mut saw_kb_update = false;
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::KnowledgeBaseUpdated { capsule_id } = event {
            assert_eq!(capsule_id, "cap-1");
            saw_kb_update = true;
        }
    }
    assert!(saw_kb_update);

    let stored = orchestrator.store().get("cap-1").unwrap();
    assert!(stored.is_some());
    assert!(orchestrator.store().verify_consensus().unwrap());
}

#[test]
fn unknown_sender_is_rejected_without_touching_the_store() {
    let (orchestrator, _dir) = fresh_orchestrator();
    let peer = TestPeer::new("stranger");
    let envelope = peer.build_envelope("cap-x", "Anything", "content from an unregistered peer", 0.5);

    let report = orchestrator.ingest_envelope(&envelope, "stranger");
    assert_eq!(report.result, IngestResult::InvalidSignature);
    assert!(orchestrator.store().get("cap-x").unwrap().is_none());
}

#[test]
fn second_ingest_of_same_id_is_a_no_op_not_a_duplicate() {
    let (orchestrator, _dir) = fresh_orchestrator();
    let peer = TestPeer::new("peer-b");
    orchestrator.register_peer("peer-b", peer.signing_key.verifying_key(), peer.aes_key);
    orchestrator.allow_corroboration_source("peer-b");

    let envelope = peer.build_envelope("cap-dup", "Routine", "same capsule submitted twice", 0.7);
    let first = orchestrator.ingest_envelope(&envelope, "peer-b");
    assert_eq!(first.result, IngestResult::Success);

    let second = orchestrator.ingest_envelope(&envelope, "peer-b");
    assert_eq!(second.result, IngestResult::AlreadyExists);

    assert_eq!(orchestrator.store().capsule_count().unwrap(), 1);
}
