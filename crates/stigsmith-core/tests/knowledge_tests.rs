use chrono::Utc;
use pretty_assertions::assert_eq;
use stigsmith_artifact::{BaselineKind, ControlId};
use stigsmith_core::{InMemoryKnowledgeStore, KnowledgeWriter, MemoryQuery};
use stigsmith_test_utils::{implemented_baseline, sample_stig, stub_baseline};

#[test]
fn implemented_profile_covers_every_stig_control() {
    let revised = stub_baseline().revise(BaselineKind::Implemented, implemented_baseline().controls);
    let stig = sample_stig();

    assert_eq!(revised.implemented_count(), stig.controls.len());
    for control in &stig.controls {
        let entry = revised.control(&control.id).expect("control carried over");
        assert!(entry.is_implemented(), "{} left unimplemented", control.id);
    }
}

#[tokio::test]
async fn stub_baseline_commits_no_records() {
    let store = InMemoryKnowledgeStore::default();
    let writer = KnowledgeWriter::new();

    let commit = writer.prepare(&stub_baseline(), Utc::now());
    let ack = writer.commit(&store, &commit).await.unwrap();

    assert!(commit.records.is_empty());
    assert_eq!(ack.records_written, 0);
    assert_eq!(store.commit_count(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn committed_controls_are_found_by_description() {
    let store = InMemoryKnowledgeStore::default();
    let writer = KnowledgeWriter::new();

    let commit = writer.prepare(&implemented_baseline(), Utc::now());
    let ack = writer.commit(&store, &commit).await.unwrap();
    assert_eq!(ack.records_written, 2);

    let hits = store
        .query_memory("RHEL 9 must implement NIST FIPS-validated cryptography.")
        .await
        .unwrap();
    assert_eq!(hits[0].control_id, ControlId::new("V-230223"));
    assert!(hits[0].implementation.contains("fips-mode-setup"));
    assert_eq!(hits[0].source_baseline, "rhel-9-baseline");
}

#[tokio::test]
async fn recommitting_a_baseline_writes_nothing_new() {
    let store = InMemoryKnowledgeStore::default();
    let writer = KnowledgeWriter::new();
    let baseline = implemented_baseline();

    let first = writer.commit(&store, &writer.prepare(&baseline, Utc::now())).await.unwrap();
    let second = writer.commit(&store, &writer.prepare(&baseline, Utc::now())).await.unwrap();

    assert_eq!(first.records_written, 2);
    assert_eq!(second.records_written, 0);
    assert_eq!(store.commit_count(), 2);
    assert_eq!(store.len(), 2);
}
