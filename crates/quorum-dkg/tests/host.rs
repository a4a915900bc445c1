//! Concurrent sessions on one host.

use quorum_core::{DkgStatus, DkgStep, GroupId, LedgerChannel, NodeId};
use quorum_dkg::{DkgContext, DkgHost, DkgRuntimeConfig, MemoryKeyBundleStore, SessionRequest};
use quorum_testkit::{init_tracing, roster_nodes, MockKeyService, MockLedger, StaticRoster};
use std::sync::Arc;
use std::time::Duration;

const GROUPS: [&str; 2] = ["amber", "cobalt"];

fn config() -> DkgRuntimeConfig {
    DkgRuntimeConfig {
        eth_key_name: "NEK:host".to_string(),
        ..DkgRuntimeConfig::default()
    }
}

fn member_ids(nodes: &[quorum_core::RosterNode]) -> Vec<NodeId> {
    nodes.iter().map(|node| node.id).collect()
}

#[tokio::test(start_paused = true)]
async fn test_each_node_runs_every_group_concurrently() {
    init_tracing();
    let ledger = Arc::new(MockLedger::new(300));
    let nodes = roster_nodes(3);
    let mut roster = StaticRoster::new();
    for group in GROUPS {
        roster = roster.with_group(group, nodes.clone());
        ledger.open_channel(group, &member_ids(&nodes));
    }
    let roster = Arc::new(roster);

    let mut hosts = Vec::new();
    let mut stores = Vec::new();
    for node in &nodes {
        let store = Arc::new(MemoryKeyBundleStore::new());
        let context = DkgContext::new(
            ledger.clone(),
            roster.clone(),
            Arc::new(MockKeyService::new(3)),
            store.clone(),
            config(),
        );
        let mut host = DkgHost::new(context);
        for group in GROUPS {
            host.spawn(SessionRequest::new(group, node.id, 0));
        }
        assert_eq!(host.len(), 2);
        hosts.push(host);
        stores.push(store);
    }

    for host in &mut hosts {
        let results = host.join_all().await;
        let groups: Vec<_> = results.iter().map(|(r, _)| r.group_name.as_str()).collect();
        assert_eq!(groups, GROUPS);
        for (request, result) in &results {
            assert_eq!(result.status, DkgStatus::Done, "{}", request.group_name);
        }
        assert!(host.is_empty());
    }
    for store in &stores {
        assert_eq!(store.len().await, 2);
    }
    for group in GROUPS {
        let id = GroupId::from_name(group);
        assert!(ledger.is_last_dkg_successful(&id).await.unwrap());
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_waiting_sessions() {
    init_tracing();
    let ledger = Arc::new(MockLedger::new(300));
    let nodes = roster_nodes(3);
    ledger.open_channel("amber", &member_ids(&nodes));
    let roster = Arc::new(StaticRoster::new().with_group("amber", nodes.clone()));
    let context = DkgContext::new(
        ledger.clone(),
        roster,
        Arc::new(MockKeyService::new(3)),
        Arc::new(MemoryKeyBundleStore::new()),
        config(),
    );

    let mut host = DkgHost::new(context);
    host.spawn(SessionRequest::new("amber", nodes[0].id, 0));
    // The other members never broadcast; the session keeps polling
    tokio::time::sleep(Duration::from_secs(90)).await;
    host.shutdown();

    let results = host.join_all().await;
    assert_eq!(results.len(), 1);
    let (_, result) = &results[0];
    assert_eq!(result.status, DkgStatus::Failed);
    assert_eq!(result.step, DkgStep::Broadcast);
    assert_eq!(ledger.transaction_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_key_service_retry() {
    init_tracing();
    let ledger = Arc::new(MockLedger::new(300));
    let nodes = roster_nodes(3);
    ledger.open_channel("amber", &member_ids(&nodes));
    let roster = Arc::new(StaticRoster::new().with_group("amber", nodes.clone()));
    let key_service = Arc::new(MockKeyService::new(3));
    key_service.fail_next_calls(usize::MAX);
    let context = DkgContext::new(
        ledger.clone(),
        roster,
        key_service,
        Arc::new(MemoryKeyBundleStore::new()),
        config(),
    );

    let mut host = DkgHost::new(context);
    host.spawn(SessionRequest::new("amber", nodes[0].id, 0));
    // Polynomial generation never gets through; the session sits in retry
    tokio::time::sleep(Duration::from_secs(60)).await;
    host.shutdown();

    let results = tokio::time::timeout(Duration::from_secs(3600), host.join_all())
        .await
        .expect("shutdown did not reach the key service retry");
    let (_, result) = &results[0];
    assert_eq!(result.status, DkgStatus::Failed);
    assert_eq!(result.step, DkgStep::None);
    assert_eq!(ledger.transaction_count(), 0);
}
