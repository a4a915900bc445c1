//! In-memory ledger simulating the DKG channel contract.
//!
//! Every transaction is mined into its own block at the current ledger time.
//! Ledger time is tokio time, so tests on a paused clock move through DKG
//! timeouts instantly. The contract rules follow the production channel
//! closely enough for protocol tests:
//!
//! - broadcasts are accepted until the broadcast timeout; once everyone has
//!   broadcast the alright phase starts
//! - the channel closes successfully when every member has sent alright
//! - a complaint about a missing broadcast, alright or response fails the
//!   group once the relevant timeout has passed, and is rejected with a
//!   `ComplaintError` log before that
//! - a bad-data complaint is recorded; the accused's response fails the
//!   group

use async_trait::async_trait;
use parking_lot::Mutex;
use quorum_core::wire::{complaint_error_signature, encode_broadcast_payload, BROADCAST_EVENT_SIGNATURE};
use quorum_core::{
    Address, Block, ComplaintData, G2Point, GroupId, KeyShare, LedgerChannel, LedgerError,
    LedgerResult, LogEntry, NodeId, Transaction, TxHash, TxReceipt, H256,
};
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;

/// Ledger timestamp at test start
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Address of the simulated DKG contract
pub const DKG_CONTRACT: Address = Address([0xd1; 20]);

const COMPLAINT_SENT_EVENT: &str = "ComplaintSent(bytes32,uint256,uint256)";
const FAILED_DKG_EVENT: &str = "FailedDKG(bytes32)";
const SUCCESSFUL_DKG_EVENT: &str = "SuccessfulDKG(bytes32)";
const ALL_DATA_RECEIVED_EVENT: &str = "AllDataReceived(bytes32,uint256)";
const RESPONSE_EVENT: &str = "ResponseSent(bytes32,uint256)";

#[derive(Debug, Clone)]
struct GroupChannel {
    members: Vec<NodeId>,
    opened: bool,
    started_time: u64,
    started_block: u64,
    broadcasted: BTreeSet<NodeId>,
    alright_started_time: u64,
    completed: BTreeSet<NodeId>,
    complaint: ComplaintData,
    complaint_time: u64,
    pre_responded: bool,
    last_successful: bool,
    common_public_key: Option<G2Point>,
}

impl GroupChannel {
    fn everyone_broadcasted(&self) -> bool {
        self.broadcasted.len() == self.members.len()
    }

    fn is_member(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    blocks: Vec<Block>,
    receipts: HashMap<TxHash, TxReceipt>,
    groups: HashMap<GroupId, GroupChannel>,
    unavailable: bool,
    dkg_transactions: usize,
    nonce: u64,
}

/// Outcome of a complaint evaluated by the simulated contract.
enum ComplaintOutcome {
    Fail,
    Reject(&'static str),
}

/// Simulated ledger shared by every node of a test.
#[derive(Debug)]
pub struct MockLedger {
    dkg_timeout: u64,
    origin: Instant,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    /// Ledger with the given DKG timeout, in seconds
    pub fn new(dkg_timeout: u64) -> Self {
        let ledger = Self {
            dkg_timeout,
            origin: Instant::now(),
            state: Mutex::new(LedgerState::default()),
        };
        let now = ledger.now();
        ledger.state.lock().blocks.push(Block {
            number: 0,
            timestamp: now,
            transactions: Vec::new(),
        });
        ledger
    }

    /// Current ledger time
    pub fn now(&self) -> u64 {
        GENESIS_TIMESTAMP + self.origin.elapsed().as_secs()
    }

    /// Open (or reopen) the channel of `group_name` for `members`
    pub fn open_channel(&self, group_name: &str, members: &[NodeId]) {
        let now = self.now();
        let mut state = self.state.lock();
        let block = Self::mine_empty(&mut state, now);
        let group = GroupId::from_name(group_name);
        let last_successful = state
            .groups
            .get(&group)
            .is_some_and(|g| g.last_successful);
        state.groups.insert(
            group,
            GroupChannel {
                members: members.to_vec(),
                opened: true,
                started_time: now,
                started_block: block,
                broadcasted: BTreeSet::new(),
                alright_started_time: 0,
                completed: BTreeSet::new(),
                complaint: ComplaintData::NONE,
                complaint_time: 0,
                pre_responded: false,
                last_successful,
                common_public_key: None,
            },
        );
        tracing::debug!(group = group_name, started = now, block, "channel opened");
    }

    /// Reopen the channel with the same members, as after a failed round
    pub fn restart_channel(&self, group_name: &str) {
        let members = self
            .state
            .lock()
            .groups
            .get(&GroupId::from_name(group_name))
            .map(|g| g.members.clone())
            .unwrap_or_default();
        self.open_channel(group_name, &members);
    }

    /// Close the channel as failed
    pub fn fail_group(&self, group_name: &str) {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(&GroupId::from_name(group_name)) {
            group.opened = false;
            group.last_successful = false;
        }
    }

    /// Close the channel as successful, with every member complete
    pub fn complete_group(&self, group_name: &str) {
        let id = GroupId::from_name(group_name);
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(&id) {
            group.completed = group.members.iter().copied().collect();
            Self::succeed(group, &id);
        }
    }

    /// Make every ledger call fail as unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Number of transactions mined against the DKG contract
    pub fn transaction_count(&self) -> usize {
        self.state.lock().dkg_transactions
    }

    /// Mine a transaction to an unrelated contract
    pub fn submit_foreign_transaction(&self) -> TxReceipt {
        let now = self.now();
        let mut state = self.state.lock();
        Self::mine(&mut state, now, Address([0xee; 20]), Vec::new())
    }

    /// Drop the receipt of a mined transaction, as if not yet indexed
    pub fn forget_receipt(&self, tx_hash: TxHash) {
        self.state.lock().receipts.remove(&tx_hash);
    }

    fn mine_empty(state: &mut LedgerState, now: u64) -> u64 {
        let number = state.blocks.len() as u64;
        state.blocks.push(Block {
            number,
            timestamp: now,
            transactions: Vec::new(),
        });
        number
    }

    fn mine(state: &mut LedgerState, now: u64, to: Address, logs: Vec<LogEntry>) -> TxReceipt {
        state.nonce += 1;
        let hash = H256::keccak(&state.nonce.to_be_bytes());
        let number = state.blocks.len() as u64;
        state.blocks.push(Block {
            number,
            timestamp: now,
            transactions: vec![Transaction {
                hash,
                to: Some(to),
            }],
        });
        let receipt = TxReceipt {
            tx_hash: hash,
            block_number: number,
            status: true,
            logs,
        };
        state.receipts.insert(hash, receipt.clone());
        receipt
    }

    fn log(topics: Vec<H256>, data: Vec<u8>) -> LogEntry {
        LogEntry {
            address: DKG_CONTRACT,
            topics,
            data,
        }
    }

    fn event(signature: &str, group: &GroupId) -> LogEntry {
        Self::log(
            vec![H256::keccak(signature.as_bytes()), group.as_topic()],
            Vec::new(),
        )
    }

    fn succeed(group: &mut GroupChannel, id: &GroupId) {
        group.opened = false;
        group.last_successful = true;
        let coords = [0u8, 1, 2, 3].map(|i| {
            let mut seed = id.as_topic().0.to_vec();
            seed.push(i);
            H256::keccak(&seed)
        });
        group.common_public_key = Some(G2Point(coords));
    }

    fn fail(group: &mut GroupChannel) {
        group.opened = false;
        group.last_successful = false;
    }

    /// Run a read against a group
    fn read<T>(&self, group: &GroupId, f: impl FnOnce(&GroupChannel) -> T) -> LedgerResult<T> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(LedgerError::unavailable("ledger endpoint unreachable"));
        }
        state
            .groups
            .get(group)
            .map(f)
            .ok_or_else(|| LedgerError::not_found(format!("group {group}")))
    }

    /// Run a DKG transaction against a group. `f` returns the logs of the
    /// transaction, or a revert reason.
    fn transact(
        &self,
        group: &GroupId,
        f: impl FnOnce(&mut GroupChannel, u64) -> Result<Vec<LogEntry>, &'static str>,
    ) -> LedgerResult<TxReceipt> {
        let now = self.now();
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(LedgerError::unavailable("ledger endpoint unreachable"));
        }
        let channel = state
            .groups
            .get_mut(group)
            .ok_or_else(|| LedgerError::not_found(format!("group {group}")))?;
        let logs = f(channel, now).map_err(LedgerError::reverted)?;
        state.dkg_transactions += 1;
        Ok(Self::mine(&mut state, now, DKG_CONTRACT, logs))
    }

    fn broadcast_possible(&self, g: &GroupChannel, node: NodeId, now: u64) -> bool {
        g.opened
            && g.is_member(node)
            && !g.broadcasted.contains(&node)
            && now.saturating_sub(g.started_time) <= self.dkg_timeout
    }

    fn alright_possible(&self, g: &GroupChannel, node: NodeId, now: u64) -> bool {
        g.opened
            && g.is_member(node)
            && g.everyone_broadcasted()
            && !g.completed.contains(&node)
            && g.complaint.is_none()
            && now.saturating_sub(g.alright_started_time) <= self.dkg_timeout
    }

    fn complaint_possible(g: &GroupChannel, from: NodeId, to: NodeId) -> bool {
        g.opened
            && g.is_member(from)
            && g.is_member(to)
            && from != to
            && (g.complaint.is_none() || (g.complaint.accuser == from && g.complaint.accused == to))
    }

    fn evaluate_complaint(&self, g: &GroupChannel, from: NodeId, to: NodeId, now: u64) -> ComplaintOutcome {
        if !g.complaint.is_none() {
            let expired = now.saturating_sub(g.complaint_time) > self.dkg_timeout;
            return if g.complaint.accuser == from && g.complaint.accused == to && expired {
                ComplaintOutcome::Fail
            } else {
                ComplaintOutcome::Reject("The accused node has time to send a response")
            };
        }
        if !g.broadcasted.contains(&to) {
            return if now.saturating_sub(g.started_time) > self.dkg_timeout {
                ComplaintOutcome::Fail
            } else {
                ComplaintOutcome::Reject("Broadcast is not over")
            };
        }
        if !g.everyone_broadcasted() {
            return ComplaintOutcome::Reject("Node sent broadcast");
        }
        if !g.completed.contains(&to) {
            return if now.saturating_sub(g.alright_started_time) > self.dkg_timeout {
                ComplaintOutcome::Fail
            } else {
                ComplaintOutcome::Reject("Alright is not over")
            };
        }
        ComplaintOutcome::Reject("Node sent alright")
    }

    fn complaint_error(group: &GroupId, reason: &str) -> LogEntry {
        Self::log(
            vec![complaint_error_signature(), group.as_topic()],
            reason.as_bytes().to_vec(),
        )
    }
}

#[async_trait]
impl LedgerChannel for MockLedger {
    fn dkg_contract_address(&self) -> Address {
        DKG_CONTRACT
    }

    async fn latest_block(&self) -> LedgerResult<Block> {
        let now = self.now();
        let state = self.state.lock();
        if state.unavailable {
            return Err(LedgerError::unavailable("ledger endpoint unreachable"));
        }
        Ok(Block {
            number: state.blocks.len().saturating_sub(1) as u64,
            timestamp: now,
            transactions: Vec::new(),
        })
    }

    async fn block(&self, number: u64) -> LedgerResult<Block> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(LedgerError::unavailable("ledger endpoint unreachable"));
        }
        usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("block {number}")))
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> LedgerResult<TxReceipt> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(LedgerError::unavailable("ledger endpoint unreachable"));
        }
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::ReceiptNotFound {
                tx_hash: tx_hash.to_string(),
            })
    }

    async fn dkg_timeout(&self) -> LedgerResult<u64> {
        Ok(self.dkg_timeout)
    }

    async fn is_channel_opened(&self, group: &GroupId) -> LedgerResult<bool> {
        self.read(group, |g| g.opened)
    }

    async fn channel_started_time(&self, group: &GroupId) -> LedgerResult<u64> {
        self.read(group, |g| g.started_time)
    }

    async fn channel_started_block(&self, group: &GroupId) -> LedgerResult<u64> {
        self.read(group, |g| g.started_block)
    }

    async fn alright_started_time(&self, group: &GroupId) -> LedgerResult<u64> {
        self.read(group, |g| g.alright_started_time)
    }

    async fn is_last_dkg_successful(&self, group: &GroupId) -> LedgerResult<bool> {
        self.read(group, |g| g.last_successful)
    }

    async fn is_node_broadcasted(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        self.read(group, |g| g.broadcasted.contains(&node))
    }

    async fn is_everyone_broadcasted(&self, group: &GroupId) -> LedgerResult<bool> {
        self.read(group, GroupChannel::everyone_broadcasted)
    }

    async fn is_all_data_received(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        self.read(group, |g| g.completed.contains(&node))
    }

    async fn number_of_completed(&self, group: &GroupId) -> LedgerResult<u64> {
        self.read(group, |g| g.completed.len() as u64)
    }

    async fn complaint_data(&self, group: &GroupId) -> LedgerResult<ComplaintData> {
        self.read(group, |g| g.complaint)
    }

    async fn common_public_key(&self, group: &GroupId) -> LedgerResult<G2Point> {
        self.read(group, |g| g.common_public_key)?
            .ok_or_else(|| LedgerError::not_found(format!("common public key of {group}")))
    }

    async fn is_broadcast_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        let now = self.now();
        self.read(group, |g| self.broadcast_possible(g, node, now))
    }

    async fn is_alright_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        let now = self.now();
        self.read(group, |g| self.alright_possible(g, node, now))
    }

    async fn is_complaint_possible(
        &self,
        group: &GroupId,
        from: NodeId,
        to: NodeId,
    ) -> LedgerResult<bool> {
        self.read(group, |g| Self::complaint_possible(g, from, to))
    }

    async fn is_pre_response_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        self.read(group, |g| {
            g.opened && !g.complaint.is_none() && g.complaint.accused == node && !g.pre_responded
        })
    }

    async fn is_response_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool> {
        self.read(group, |g| {
            g.opened && !g.complaint.is_none() && g.complaint.accused == node && g.pre_responded
        })
    }

    async fn broadcast(
        &self,
        group: &GroupId,
        node: NodeId,
        verification_vector: &[G2Point],
        secret_key_contribution: &[KeyShare],
        _rotation_id: u64,
    ) -> LedgerResult<TxReceipt> {
        let id = *group;
        self.transact(group, |g, now| {
            if !self.broadcast_possible(g, node, now) {
                return Err("Incorrect time for broadcast");
            }
            if secret_key_contribution.len() != g.members.len() {
                return Err("Incorrect number of secret key shares");
            }
            g.broadcasted.insert(node);
            if g.everyone_broadcasted() {
                g.alright_started_time = now;
            }
            Ok(vec![Self::log(
                vec![BROADCAST_EVENT_SIGNATURE, id.as_topic(), H256::from_u64(node.0)],
                encode_broadcast_payload(verification_vector, secret_key_contribution),
            )])
        })
    }

    async fn alright(&self, group: &GroupId, node: NodeId) -> LedgerResult<TxReceipt> {
        let id = *group;
        self.transact(group, |g, now| {
            if !self.alright_possible(g, node, now) {
                return Err("Incorrect time for alright");
            }
            g.completed.insert(node);
            let mut logs = vec![Self::event(ALL_DATA_RECEIVED_EVENT, &id)];
            if g.completed.len() == g.members.len() {
                Self::succeed(g, &id);
                logs.push(Self::event(SUCCESSFUL_DKG_EVENT, &id));
            }
            Ok(logs)
        })
    }

    async fn complaint(&self, group: &GroupId, from: NodeId, to: NodeId) -> LedgerResult<TxReceipt> {
        let id = *group;
        self.transact(group, |g, now| {
            if !Self::complaint_possible(g, from, to) {
                return Err("Complaint is not possible");
            }
            match self.evaluate_complaint(g, from, to, now) {
                ComplaintOutcome::Fail => {
                    Self::fail(g);
                    Ok(vec![
                        Self::event(COMPLAINT_SENT_EVENT, &id),
                        Self::event(FAILED_DKG_EVENT, &id),
                    ])
                }
                ComplaintOutcome::Reject(reason) => Ok(vec![Self::complaint_error(&id, reason)]),
            }
        })
    }

    async fn complaint_bad_data(
        &self,
        group: &GroupId,
        from: NodeId,
        to: NodeId,
    ) -> LedgerResult<TxReceipt> {
        let id = *group;
        self.transact(group, |g, now| {
            if !Self::complaint_possible(g, from, to) {
                return Err("Complaint is not possible");
            }
            if !g.complaint.is_none() || !g.broadcasted.contains(&to) {
                return Ok(vec![Self::complaint_error(&id, "Complaint is already sent")]);
            }
            g.complaint = ComplaintData {
                accuser: from,
                accused: to,
            };
            g.complaint_time = now;
            Ok(vec![Self::event(COMPLAINT_SENT_EVENT, &id)])
        })
    }

    async fn pre_response(
        &self,
        group: &GroupId,
        node: NodeId,
        _verification_vector: &[G2Point],
        _verification_vector_mult: &[G2Point],
        secret_key_contribution: &[KeyShare],
    ) -> LedgerResult<TxReceipt> {
        self.transact(group, |g, _| {
            if !g.opened || g.complaint.accused != node || g.pre_responded {
                return Err("Incorrect time for pre-response");
            }
            if secret_key_contribution.len() != g.members.len() {
                return Err("Incorrect number of secret key shares");
            }
            g.pre_responded = true;
            Ok(Vec::new())
        })
    }

    async fn response(
        &self,
        group: &GroupId,
        node: NodeId,
        _dh_key: H256,
        _share: G2Point,
    ) -> LedgerResult<TxReceipt> {
        let id = *group;
        self.transact(group, |g, _| {
            if !g.opened || g.complaint.accused != node || !g.pre_responded {
                return Err("Incorrect time for response");
            }
            // Either side of the dispute is removed, so the round always fails.
            Self::fail(g);
            Ok(vec![
                Self::event(RESPONSE_EVENT, &id),
                Self::event(FAILED_DKG_EVENT, &id),
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn members() -> Vec<NodeId> {
        vec![NodeId(1), NodeId(2), NodeId(3)]
    }

    fn shares(n: usize) -> Vec<KeyShare> {
        (0..n)
            .map(|i| KeyShare {
                public_key: [H256::from_u64(i as u64), H256::ZERO],
                share: H256::from_u64(7),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_everyone_alright_closes_channel_successfully() {
        let ledger = MockLedger::new(300);
        ledger.open_channel("g", &members());
        let group = GroupId::from_name("g");
        for node in members() {
            ledger
                .broadcast(&group, node, &[G2Point::default()], &shares(3), 0)
                .await
                .unwrap();
        }
        assert!(ledger.is_everyone_broadcasted(&group).await.unwrap());
        for node in members() {
            ledger.alright(&group, node).await.unwrap();
        }
        assert!(!ledger.is_channel_opened(&group).await.unwrap());
        assert!(ledger.is_last_dkg_successful(&group).await.unwrap());
        assert!(ledger.common_public_key(&group).await.is_ok());
        assert_eq!(ledger.transaction_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_complaint_is_rejected_late_one_fails_group() {
        let ledger = MockLedger::new(300);
        ledger.open_channel("g", &members());
        let group = GroupId::from_name("g");

        let receipt = ledger.complaint(&group, NodeId(1), NodeId(2)).await.unwrap();
        assert_eq!(receipt.logs[0].topics[0], complaint_error_signature());
        assert!(ledger.is_channel_opened(&group).await.unwrap());

        tokio::time::advance(Duration::from_secs(301)).await;
        let receipt = ledger.complaint(&group, NodeId(1), NodeId(2)).await.unwrap();
        assert_ne!(receipt.logs[0].topics[0], complaint_error_signature());
        assert!(!ledger.is_channel_opened(&group).await.unwrap());
        assert!(!ledger.is_last_dkg_successful(&group).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_data_then_response_fails_group() {
        let ledger = MockLedger::new(300);
        ledger.open_channel("g", &members());
        let group = GroupId::from_name("g");
        for node in members() {
            ledger
                .broadcast(&group, node, &[G2Point::default()], &shares(3), 0)
                .await
                .unwrap();
        }
        ledger
            .complaint_bad_data(&group, NodeId(1), NodeId(3))
            .await
            .unwrap();
        let data = ledger.complaint_data(&group).await.unwrap();
        assert!(data.targets(NodeId(3)));
        assert!(!ledger.is_alright_possible(&group, NodeId(2)).await.unwrap());

        assert!(ledger.is_pre_response_possible(&group, NodeId(3)).await.unwrap());
        ledger
            .pre_response(&group, NodeId(3), &[], &[], &shares(3))
            .await
            .unwrap();
        assert!(ledger.is_response_possible(&group, NodeId(3)).await.unwrap());
        ledger
            .response(&group, NodeId(3), H256::ZERO, G2Point::default())
            .await
            .unwrap();
        assert!(!ledger.is_channel_opened(&group).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_moves_started_time_and_block() {
        let ledger = MockLedger::new(300);
        ledger.open_channel("g", &members());
        let group = GroupId::from_name("g");
        let time = ledger.channel_started_time(&group).await.unwrap();
        let block = ledger.channel_started_block(&group).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        ledger.restart_channel("g");
        assert_eq!(
            ledger.channel_started_time(&group).await.unwrap(),
            time + 10
        );
        assert!(ledger.channel_started_block(&group).await.unwrap() > block);
    }
}
