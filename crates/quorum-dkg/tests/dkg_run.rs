//! End-to-end DKG runs over the simulated ledger.

use assert_matches::assert_matches;
use quorum_core::{wire, DkgStatus, DkgStep, GroupId, LedgerChannel, SecureKeyService};
use quorum_dkg::{
    run_dkg, DkgContext, DkgRunResult, DkgRuntimeConfig, KeyBundleStore, MemoryKeyBundleStore,
    PollTimer, SessionRequest,
};
use quorum_testkit::{init_tracing, Committee};
use std::sync::Arc;
use std::time::Duration;

const DKG_TIMEOUT: u64 = 300;

fn config() -> DkgRuntimeConfig {
    DkgRuntimeConfig {
        eth_key_name: "NEK:test".to_string(),
        ..DkgRuntimeConfig::default()
    }
}

fn node_context(committee: &Committee, index: usize, store: Arc<MemoryKeyBundleStore>) -> DkgContext {
    DkgContext::new(
        committee.ledger.clone(),
        committee.roster.clone(),
        committee.key_services[index].clone(),
        store,
        config(),
    )
}

struct NodeRun {
    result: DkgRunResult,
    store: Arc<MemoryKeyBundleStore>,
}

type NodeTask = (
    tokio::task::JoinHandle<DkgRunResult>,
    Arc<MemoryKeyBundleStore>,
);

/// Start the listed members concurrently, each with its own store
fn spawn_nodes(committee: &Committee, indices: &[usize]) -> Vec<NodeTask> {
    indices
        .iter()
        .map(|&index| {
            let store = Arc::new(MemoryKeyBundleStore::new());
            let context = node_context(committee, index, store.clone());
            let request = SessionRequest::new(&committee.group_name, committee.node_id(index), 0);
            let handle = tokio::spawn(async move {
                let timer = PollTimer::detached(context.config.poll_interval());
                run_dkg(&context, &request, timer).await
            });
            (handle, store)
        })
        .collect()
}

async fn join_nodes(tasks: Vec<NodeTask>) -> Vec<NodeRun> {
    let mut runs = Vec::with_capacity(tasks.len());
    for (handle, store) in tasks {
        runs.push(NodeRun {
            result: handle.await.unwrap(),
            store,
        });
    }
    runs
}

async fn run_nodes(committee: &Committee, indices: &[usize]) -> Vec<NodeRun> {
    join_nodes(spawn_nodes(committee, indices)).await
}

/// Publish a valid broadcast for the member at `index` without running a
/// session for it, so it never sends alright
async fn broadcast_only(committee: &Committee, index: usize) {
    let service = &committee.key_services[index];
    let poly_name = format!("POLY:NODE_ID:{index}:DKG_ID:0");
    service.generate_dkg_poly(&poly_name).await.unwrap();
    let vector = service.verification_vector(&poly_name).await.unwrap();
    let public_keys: Vec<String> = committee
        .nodes
        .iter()
        .map(|node| node.public_key.clone())
        .collect();
    let contribution = service
        .secret_key_contribution(&poly_name, &public_keys)
        .await
        .unwrap();
    let shares = wire::key_shares_from_native(&contribution, committee.n()).unwrap();
    committee
        .ledger
        .broadcast(
            &GroupId::from_name(&committee.group_name),
            committee.node_id(index),
            &vector,
            &shares,
            0,
        )
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_all_members_complete_dkg() {
    init_tracing();
    let committee = Committee::new("elated-tan-skat", 4, DKG_TIMEOUT);
    let runs = run_nodes(&committee, &[0, 1, 2, 3]).await;

    let group = GroupId::from_name(&committee.group_name);
    assert!(!committee.ledger.is_channel_opened(&group).await.unwrap());
    assert!(committee.ledger.is_last_dkg_successful(&group).await.unwrap());
    // One broadcast and one alright per member
    assert_eq!(committee.ledger.transaction_count(), 8);

    let first = runs[0].result.keys.clone().unwrap();
    for (index, run) in runs.iter().enumerate() {
        assert_eq!(run.result.status, DkgStatus::Done, "node {index}");
        assert_eq!(run.result.step, DkgStep::KeyGeneration);

        let bundle = run.result.keys.clone().unwrap();
        assert_eq!((bundle.t, bundle.n), (3, 4));
        assert_eq!(bundle.common_public_key, first.common_public_key);
        assert_eq!(bundle.bls_public_keys, first.bls_public_keys);
        assert_eq!(bundle.bls_public_keys.len(), 4);
        assert!(bundle.key_share_name.contains(&format!(":NODE_ID:{index}:DKG_ID:0")));

        let stored = run.store.load(&committee.group_name, 0).await.unwrap();
        assert_eq!(stored, bundle);
        assert_eq!(committee.key_services[index].create_calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_broadcast_fails_group() {
    init_tracing();
    let committee = Committee::new("missing-broadcast", 4, DKG_TIMEOUT);
    let runs = run_nodes(&committee, &[0, 1, 2]).await;

    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Failed);
        assert!(run.result.keys.is_none());
        assert!(run.result.step >= DkgStep::Broadcast);
        assert!(run.store.is_empty().await);
    }
    // The first accepted complaint fails the group; the others notice on
    // their next poll, still in the broadcast phase
    let complainers = runs
        .iter()
        .filter(|run| run.result.step == DkgStep::ComplaintNoBroadcast)
        .count();
    assert_eq!(complainers, 1);

    let group = GroupId::from_name(&committee.group_name);
    assert!(!committee.ledger.is_channel_opened(&group).await.unwrap());
    assert!(!committee.ledger.is_last_dkg_successful(&group).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_bad_data_is_answered_and_group_fails() {
    init_tracing();
    let committee = Committee::new("bad-data", 4, DKG_TIMEOUT);
    committee.key_services[3].corrupt_contributions();
    let runs = run_nodes(&committee, &[0, 1, 2, 3]).await;

    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Failed);
    }
    let complainers = runs
        .iter()
        .filter(|run| run.result.step == DkgStep::ComplaintBadData)
        .count();
    assert_eq!(complainers, 1);
    assert_eq!(runs[3].result.step, DkgStep::Response);

    let group = GroupId::from_name(&committee.group_name);
    assert!(!committee.ledger.is_last_dkg_successful(&group).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_share_becomes_bad_data_complaint() {
    init_tracing();
    let committee = Committee::new("rejected-share", 4, DKG_TIMEOUT);
    // Node 0 verifies node 1 first; the service refuses that share outright
    committee.key_services[0].reject_next_verifications(1);
    let runs = run_nodes(&committee, &[0, 1, 2, 3]).await;

    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Failed);
    }
    assert_eq!(runs[0].result.step, DkgStep::ComplaintBadData);
    assert_eq!(runs[1].result.step, DkgStep::Response);
    let complainers = runs
        .iter()
        .filter(|run| run.result.step == DkgStep::ComplaintBadData)
        .count();
    assert_eq!(complainers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_alright_fails_group() {
    init_tracing();
    let committee = Committee::new("missing-alright", 4, DKG_TIMEOUT);
    broadcast_only(&committee, 3).await;
    let runs = run_nodes(&committee, &[0, 1, 2]).await;

    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Failed);
        assert!(run.result.keys.is_none());
    }
    let complainers = runs
        .iter()
        .filter(|run| run.result.step == DkgStep::ComplaintNoAlright)
        .count();
    assert_eq!(complainers, 1);
    assert!(runs
        .iter()
        .filter(|run| run.result.step != DkgStep::ComplaintNoAlright)
        .all(|run| run.result.step == DkgStep::AlrightReceiving));

    // Four broadcasts, three alrights, one complaint
    assert_eq!(committee.ledger.transaction_count(), 8);
    let group = GroupId::from_name(&committee.group_name);
    assert!(!committee.ledger.is_channel_opened(&group).await.unwrap());
    assert!(!committee.ledger.is_last_dkg_successful(&group).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_channel_restart_mid_run_fails_every_member() {
    init_tracing();
    let committee = Committee::new("restarted", 4, DKG_TIMEOUT);
    let tasks = spawn_nodes(&committee, &[0, 1, 2]);
    tokio::time::sleep(Duration::from_secs(60)).await;
    committee.ledger.restart_channel(&committee.group_name);
    let runs = join_nodes(tasks).await;

    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Failed);
        assert_eq!(run.result.step, DkgStep::Broadcast);
        assert!(run.store.is_empty().await);
    }
    assert_eq!(committee.ledger.transaction_count(), 3);
    let group = GroupId::from_name(&committee.group_name);
    assert!(committee.ledger.is_channel_opened(&group).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rerun_after_success_reuses_ledger_data_and_key() {
    init_tracing();
    let committee = Committee::new("rerun", 4, DKG_TIMEOUT);
    let runs = run_nodes(&committee, &[0, 1, 2, 3]).await;
    let original = runs[1].result.keys.clone().unwrap();
    let original_shares = committee.key_services[1].last_created_shares().unwrap();
    let transactions = committee.ledger.transaction_count();

    // Key is still held by the key service: fetched, not recreated
    let rerun = run_nodes(&committee, &[1]).await;
    assert_eq!(rerun[0].result.status, DkgStatus::Done);
    assert_eq!(rerun[0].result.keys.as_ref(), Some(&original));
    assert_eq!(committee.key_services[1].create_calls(), 1);
    assert_eq!(committee.ledger.transaction_count(), transactions);

    // Key lost: recreated from the shares replayed off the ledger
    committee.key_services[1].forget_bls_keys();
    let rerun = run_nodes(&committee, &[1]).await;
    assert_eq!(rerun[0].result.status, DkgStatus::Done);
    assert_eq!(committee.key_services[1].create_calls(), 2);
    assert_eq!(
        committee.key_services[1].last_created_shares(),
        Some(original_shares)
    );
    assert_eq!(committee.ledger.transaction_count(), transactions);
}

#[tokio::test(start_paused = true)]
async fn test_key_service_outage_is_retried() {
    init_tracing();
    let committee = Committee::new("outage", 3, DKG_TIMEOUT);
    committee.key_services[0].fail_next_calls(3);
    let runs = run_nodes(&committee, &[0, 1, 2]).await;
    for run in &runs {
        assert_eq!(run.result.status, DkgStatus::Done);
    }
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_without_completion_fails() {
    init_tracing();
    let committee = Committee::new("closed", 3, DKG_TIMEOUT);
    committee.ledger.fail_group("closed");
    let runs = run_nodes(&committee, &[0]).await;
    assert_eq!(runs[0].result.status, DkgStatus::Failed);
    assert_eq!(runs[0].result.step, DkgStep::None);
    assert_eq!(committee.ledger.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_node_outside_group_waits_out_failure_window() {
    init_tracing();
    let committee = Committee::new("outsider", 3, DKG_TIMEOUT);
    let store = Arc::new(MemoryKeyBundleStore::new());
    let context = node_context(&committee, 0, store);
    let request = SessionRequest::new("outsider", quorum_core::NodeId(1), 0);

    let started = tokio::time::Instant::now();
    let result = quorum_dkg::get_session(
        &context,
        &request,
        PollTimer::detached(context.config.poll_interval()),
    )
    .await;
    assert_matches!(result, Err(quorum_dkg::DkgError::Initialization { .. }));
    assert!(started.elapsed().as_secs() >= DKG_TIMEOUT);
}
