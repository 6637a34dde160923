//! Contract Test: Ownership and Batch Shape
//!
//! This test verifies that the engine only ever touches records it owns and
//! that every batch it submits is well-formed.
//!
//! Constraints verified:
//! - Records without this deployment's tag are never deleted or updated
//! - A tag that merely starts with ours belongs to another deployment
//! - A record repaired in a run is never deleted in the same run
//! - No id appears twice in a batch
//! - Deletes are applied before updates, updates before creates
//!
//! If this test fails, the engine can destroy records managed by someone else
//! or submit a batch the provider would reject.

mod common;

use common::*;
use neighdns_core::config::RecordBinding;
use neighdns_core::traits::{NeighborState, RemoteRecord};
use std::collections::HashSet;

#[tokio::test]
async fn untagged_records_are_never_touched() {
    let table = FakeNeighborTable::new(vec![neighbor(HOST, "2001:db8::1", NeighborState::Reachable)]);
    let foreign = vec![
        foreign_record("m1", "virt1", "2001:db8::5", Some("manual entry")),
        foreign_record("m2", "virt1", "2001:db8::6", None),
        foreign_record("m3", "retired", "2001:db8::7", Some("DDNS-router2  other box")),
    ];
    let provider = ModelProvider::new(foreign.clone());

    let report = engine(minimal_config(), &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");

    let foreign_ids: HashSet<&str> = foreign.iter().map(|r| r.id.as_str()).collect();
    for id in &report.batch.deletes {
        assert!(!foreign_ids.contains(id.as_str()), "deleted foreign record {}", id);
    }
    for update in &report.batch.updates {
        assert!(!foreign_ids.contains(update.id.as_str()), "updated foreign record {}", update.id);
    }

    for record in &foreign {
        assert!(provider.records().contains(record), "{} was modified", record.id);
    }
    assert_eq!(report.batch.creates.len(), 1);
}

#[tokio::test]
async fn deployment_with_longer_token_is_left_alone() {
    // "DDNS-router10" passes the provider's prefix filter for "DDNS-router1"
    let table = FakeNeighborTable::new(vec![]);
    let neighbor_deployment =
        foreign_record("n1", "virt1", "2001:db8::1", Some("DDNS-router10  other box"));
    let provider = ModelProvider::new(vec![
        neighbor_deployment.clone(),
        owned_record("r1", "virt1", "2001:db8::2"),
    ]);

    let report = engine(minimal_config(), &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(report.batch.deletes, vec!["r1".to_string()]);
    assert!(report.batch.updates.is_empty());
    assert_eq!(provider.records(), vec![neighbor_deployment]);
}

#[tokio::test]
async fn tagged_non_aaaa_record_is_ignored() {
    let table = FakeNeighborTable::new(vec![]);
    let mut txt: RemoteRecord = owned_record("t1", "virt1", "hello");
    txt.record_type = "TXT".to_string();
    let provider = ModelProvider::new(vec![txt]);

    let report = engine(minimal_config(), &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");

    assert!(report.batch.is_empty());
    assert_eq!(provider.records().len(), 1);
}

#[tokio::test]
async fn repaired_records_are_never_deleted() {
    // Two names, lots of stale state: every update id must be absent from deletes
    let config = minimal_config().with_binding(mac(OTHER_HOST), RecordBinding::new("db", ""));
    let table = FakeNeighborTable::new(vec![
        neighbor(HOST, "2001:db8::1", NeighborState::Reachable),
        neighbor(HOST, "2001:db8::2", NeighborState::Reachable),
        neighbor(OTHER_HOST, "2001:db8::10", NeighborState::Reachable),
    ]);
    let provider = ModelProvider::new(vec![
        owned_record("a", "virt1", "2001:db8::99"),
        owned_record("b", "virt1", "2001:db8::98"),
        owned_record("c", "virt1", "2001:db8::97"),
        owned_record("d", "db", "2001:db8::96"),
        owned_record("e", "db", "2001:db8::1"),
    ]);

    let report = engine(config, &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");
    let batch = &report.batch;

    assert!(!batch.updates.is_empty());
    for update in &batch.updates {
        assert!(!batch.deletes_id(&update.id), "{} both updated and deleted", update.id);
    }

    let mut seen = HashSet::new();
    for id in batch.deletes.iter().chain(batch.updates.iter().map(|u| &u.id)) {
        assert!(seen.insert(id.clone()), "{} listed twice", id);
    }
}

#[tokio::test]
async fn batch_is_applied_deletes_then_updates_then_creates() {
    let config = minimal_config().with_binding(mac(HOST), RecordBinding::new("alias", ""));
    let table = FakeNeighborTable::new(vec![neighbor(HOST, "2001:db8::1", NeighborState::Reachable)]);
    let provider = ModelProvider::new(vec![
        owned_record("old", "retired", "2001:db8::1"),
        owned_record("r1", "virt1", "2001:db8::2"),
    ]);

    engine(config, &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");

    let kinds: Vec<String> = provider
        .applied()
        .iter()
        .map(|op| op.split(':').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["delete", "update", "create"]);
}

#[tokio::test]
async fn created_records_carry_the_ownership_tag() {
    let config = minimal_config();
    let table = FakeNeighborTable::new(vec![neighbor(HOST, "2001:db8::1", NeighborState::Reachable)]);
    let provider = ModelProvider::new(vec![]);

    engine(config, &table, None, &provider)
        .run()
        .await
        .expect("run succeeds");

    let records = provider.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_owned_by(TAG));
    assert_eq!(records[0].comment.as_deref(), Some("DDNS-router1  "));
}
