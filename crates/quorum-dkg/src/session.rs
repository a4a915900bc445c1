//! Session state of one node in one group's DKG.
//!
//! A [`DkgSession`] owns everything the node learns during a run: the roster
//! view, received verification vectors and share records, its own sent
//! contribution and the last completed step. It is the only place that talks
//! to the key service, and it converts between the key service's share order
//! and the ledger's wire order.
//!
//! Received share records are kept in ledger order (`publicKey + share`) and
//! reordered into key-service order right before verification and key
//! creation. Verification vectors are kept as wire hex for every member,
//! including this node.
//!
//! Transactions are gated: when the contract says a transaction is not
//! possible, or the channel is closed, nothing is sent and the caller gets
//! [`Submission::Skipped`].

use crate::errors::{DkgError, DkgResult, Gate, Submission};
use crate::key_client::KeyServiceClient;
use crate::scanner::{BroadcastEvent, BroadcastScanner};
use crate::timer::PollTimer;
use quorum_core::wire::{self, RECORD_HEX_LEN};
use quorum_core::{
    ComplaintData, ComplaintReason, DkgStep, G2Point, GroupId, GroupRoster, LedgerChannel,
    LedgerError, NodeId, PolyStatus, TxReceipt, WireError, H256,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Key service name of the node's secret polynomial for one DKG attempt.
pub fn poly_name(group: &GroupId, index: usize, rotation_id: u64) -> String {
    format!(
        "POLY:SCHAIN_ID:{}:NODE_ID:{index}:DKG_ID:{rotation_id}",
        group.to_decimal()
    )
}

/// Key service name of the node's BLS key share for one DKG attempt.
pub fn bls_key_name(group: &GroupId, index: usize, rotation_id: u64) -> String {
    format!(
        "BLS_KEY:SCHAIN_ID:{}:NODE_ID:{index}:DKG_ID:{rotation_id}",
        group.to_decimal()
    )
}

/// One node's request to take part in a group's DKG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Group (workload) name
    pub group_name: String,
    /// This node's ledger id
    pub node_id: NodeId,
    /// Key rotation the DKG produces keys for
    pub rotation_id: u64,
}

impl SessionRequest {
    /// Request for `node_id` to run the DKG of `group_name`
    pub fn new(group_name: impl Into<String>, node_id: NodeId, rotation_id: u64) -> Self {
        Self {
            group_name: group_name.into(),
            node_id,
            rotation_id,
        }
    }
}

/// Protocol state of one node for one group.
pub struct DkgSession {
    group_name: String,
    group: GroupId,
    node_id: NodeId,
    index: usize,
    t: usize,
    n: usize,
    rotation_id: u64,
    eth_key_name: String,
    poly_name: String,
    bls_name: String,
    public_keys: Vec<String>,
    node_ids: Vec<NodeId>,
    indices: HashMap<NodeId, usize>,
    incoming_verification_vectors: Vec<Option<String>>,
    incoming_contributions: Vec<Option<String>>,
    sent_contribution: Option<String>,
    public_key: Option<Vec<String>>,
    dkg_timeout: u64,
    channel_started_time: u64,
    last_completed_step: DkgStep,
    complaint_error_topic: H256,
    ledger: Arc<dyn LedgerChannel>,
    keys: KeyServiceClient,
    timer: PollTimer,
}

impl DkgSession {
    /// Build a session from the group roster.
    ///
    /// Fails with [`DkgError::Initialization`] when the roster is empty, holds
    /// an empty node record, or does not contain this node.
    pub async fn init(
        request: &SessionRequest,
        eth_key_name: &str,
        roster: &dyn GroupRoster,
        ledger: Arc<dyn LedgerChannel>,
        keys: KeyServiceClient,
        timer: PollTimer,
    ) -> DkgResult<Self> {
        let group_name = request.group_name.clone();
        tracing::info!(group = %group_name, node = %request.node_id, "initializing DKG session");

        let nodes = roster.group_nodes(&group_name).await?;
        if nodes.is_empty() {
            return Err(DkgError::initialization(&group_name, "group has no nodes"));
        }

        let n = nodes.len();
        let mut index = None;
        let mut node_ids = Vec::with_capacity(n);
        let mut indices = HashMap::with_capacity(n);
        let mut public_keys = Vec::with_capacity(n);
        for (i, node) in nodes.into_iter().enumerate() {
            if node.public_key.is_empty() {
                return Err(DkgError::initialization(&group_name, "node info is empty"));
            }
            if node.id == request.node_id {
                index = Some(i);
            }
            indices.insert(node.id, i);
            node_ids.push(node.id);
            public_keys.push(node.public_key);
        }
        tracing::info!(group = %group_name, nodes = ?node_ids, "nodes in group");

        let index = index.ok_or_else(|| {
            DkgError::initialization(
                &group_name,
                format!("node {} not found in group", request.node_id),
            )
        })?;
        tracing::info!(group = %group_name, index, node = %request.node_id, "node index in group");

        let group = GroupId::from_name(&group_name);
        let dkg_timeout = ledger.dkg_timeout().await?;
        let channel_started_time = ledger.channel_started_time(&group).await?;
        tracing::info!(group = %group_name, dkg_timeout, "DKG timeout");

        Ok(Self {
            poly_name: poly_name(&group, index, request.rotation_id),
            bls_name: bls_key_name(&group, index, request.rotation_id),
            group_name,
            group,
            node_id: request.node_id,
            index,
            t: quorum_core::threshold_for(n),
            n,
            rotation_id: request.rotation_id,
            eth_key_name: eth_key_name.to_string(),
            public_keys,
            node_ids,
            indices,
            incoming_verification_vectors: vec![None; n],
            incoming_contributions: vec![None; n],
            sent_contribution: None,
            public_key: None,
            dkg_timeout,
            channel_started_time,
            last_completed_step: DkgStep::None,
            complaint_error_topic: wire::complaint_error_signature(),
            ledger,
            keys: keys.with_timer(timer.clone()),
            timer,
        })
    }

    /// Group (workload) name
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Ledger id of the group
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// This node's ledger id
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Position of this node in the group
    pub fn index(&self) -> usize {
        self.index
    }

    /// Threshold
    pub fn t(&self) -> usize {
        self.t
    }

    /// Group size
    pub fn n(&self) -> usize {
        self.n
    }

    /// Key rotation being generated
    pub fn rotation_id(&self) -> u64 {
        self.rotation_id
    }

    /// Key service name of this session's polynomial
    pub fn poly_name(&self) -> &str {
        &self.poly_name
    }

    /// Key service name of the resulting BLS key
    pub fn bls_name(&self) -> &str {
        &self.bls_name
    }

    /// Phase timeout in seconds of ledger time
    pub fn dkg_timeout(&self) -> u64 {
        self.dkg_timeout
    }

    /// Channel start time observed when the session was created
    pub fn channel_started_time(&self) -> u64 {
        self.channel_started_time
    }

    /// Furthest step reached so far
    pub fn last_completed_step(&self) -> DkgStep {
        self.last_completed_step
    }

    /// This node's BLS public key, once created or fetched
    pub fn public_key(&self) -> Option<&[String]> {
        self.public_key.as_deref()
    }

    /// Ledger channel
    pub fn ledger(&self) -> &Arc<dyn LedgerChannel> {
        &self.ledger
    }

    /// Timer paced between polls
    pub fn timer(&self) -> &PollTimer {
        &self.timer
    }

    /// Ledger id of the member at `index`
    pub fn node_id_at(&self, index: usize) -> Option<NodeId> {
        self.node_ids.get(index).copied()
    }

    /// Position of a member given its ledger id
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.indices.get(&node).copied()
    }

    /// Record progress. Never moves backwards.
    pub fn advance_step(&mut self, step: DkgStep) {
        if step <= self.last_completed_step {
            return;
        }
        tracing::info!(
            target: "quorum_dkg::step",
            group = %self.group_name,
            step = %step,
            value = step.index(),
            "last completed step"
        );
        self.last_completed_step = step;
    }

    /// A fresh scanner over this group's broadcast events
    pub fn scanner(&self) -> BroadcastScanner {
        BroadcastScanner::new(Arc::clone(&self.ledger), self.group, self.n)
    }

    // ---- ledger views ----

    /// Timestamp of the latest block
    pub async fn ledger_time(&self) -> DkgResult<u64> {
        Ok(self.ledger.latest_block().await?.timestamp)
    }

    /// Whether the group's channel is open
    pub async fn is_channel_opened(&self) -> DkgResult<bool> {
        Ok(self.ledger.is_channel_opened(&self.group).await?)
    }

    /// Whether this node's broadcast is on the ledger
    pub async fn is_node_broadcasted(&self) -> DkgResult<bool> {
        Ok(self
            .ledger
            .is_node_broadcasted(&self.group, self.node_id)
            .await?)
    }

    /// Whether every member has broadcast
    pub async fn is_everyone_broadcasted(&self) -> DkgResult<bool> {
        Ok(self.ledger.is_everyone_broadcasted(&self.group).await?)
    }

    /// Whether the member at `index` has sent alright
    pub async fn is_all_data_received(&self, index: usize) -> DkgResult<bool> {
        let Some(node) = self.node_id_at(index) else {
            return Ok(false);
        };
        Ok(self.ledger.is_all_data_received(&self.group, node).await?)
    }

    /// Whether every member has sent alright
    pub async fn is_everyone_sent_alright(&self) -> DkgResult<bool> {
        Ok(self.ledger.number_of_completed(&self.group).await? == self.n as u64)
    }

    /// The complaint on record, if any
    pub async fn complaint_data(&self) -> DkgResult<ComplaintData> {
        Ok(self.ledger.complaint_data(&self.group).await?)
    }

    async fn gate(&self, possible: bool) -> DkgResult<Gate> {
        Ok(Gate::from_checks(possible, self.is_channel_opened().await?))
    }

    fn transaction_error(&self, err: LedgerError) -> DkgError {
        if err.is_transaction_failure() {
            tracing::error!(group = %self.group_name, error = %err, "DKG transaction failed");
            DkgError::Transaction {
                group: self.group_name.clone(),
                source: err,
            }
        } else {
            DkgError::Ledger(err)
        }
    }

    // ---- received data ----

    /// Record a member's broadcast: its verification vector and the share
    /// record addressed to this node. For this node's own broadcast the full
    /// sent contribution is kept too.
    pub fn store_broadcast_data(&mut self, from: usize, event: &BroadcastEvent) -> DkgResult<()> {
        let start = RECORD_HEX_LEN * self.index;
        let record = event
            .secret_key_contribution
            .get(start..start + RECORD_HEX_LEN)
            .ok_or(WireError::TooShort {
                expected: start + RECORD_HEX_LEN,
                actual: event.secret_key_contribution.len(),
            })?;
        if from == self.index {
            self.sent_contribution = Some(wire::ledger_contribution_to_native(
                &event.secret_key_contribution,
                self.n,
            )?);
        }
        self.incoming_contributions[from] = Some(record.to_string());
        self.incoming_verification_vectors[from] = Some(event.verification_vector.clone());
        Ok(())
    }

    /// Ask the key service whether the share received from `from` matches
    /// its verification vector. Missing data does not verify.
    pub async fn verify(&self, from: usize) -> DkgResult<bool> {
        let (Some(Some(vector)), Some(Some(record))) = (
            self.incoming_verification_vectors.get(from),
            self.incoming_contributions.get(from),
        ) else {
            return Ok(false);
        };
        self.keys
            .verify_secret_share(
                vector,
                &self.eth_key_name,
                &wire::reorder_share_record(record),
                self.index,
            )
            .await
    }

    /// Store a member's broadcast and verify it.
    ///
    /// Fails with [`DkgError::Verification`] when the share does not verify,
    /// including when the key service rejects the share outright.
    pub async fn receive_from_node(&mut self, from: usize, event: &BroadcastEvent) -> DkgResult<()> {
        self.store_broadcast_data(from, event)?;
        if from == self.index {
            return Ok(());
        }
        let verified = match self.verify(from).await {
            Ok(verified) => verified,
            Err(DkgError::KeyService(err)) => {
                tracing::warn!(group = %self.group_name, from, error = %err, "key service rejected share");
                false
            }
            Err(err) => return Err(err),
        };
        if !verified {
            return Err(DkgError::Verification {
                group: self.group_name.clone(),
                from: from + 1,
                by: self.index + 1,
            });
        }
        tracing::info!(group = %self.group_name, from, "all data was received and verified");
        Ok(())
    }

    /// Replay every broadcast of the current channel in one pass.
    ///
    /// Used when the rest of the group already completed the DKG.
    pub async fn fetch_all_broadcasted_data(&mut self) -> DkgResult<()> {
        let mut scanner = self.scanner();
        for event in scanner.get_events(true).await {
            let Some(from) = self.index_of(event.node_id) else {
                tracing::warn!(group = %self.group_name, node = %event.node_id, "broadcast from unknown node");
                continue;
            };
            self.store_broadcast_data(from, &event)?;
            tracing::info!(group = %self.group_name, by = self.index, from, "received");
        }
        Ok(())
    }

    // ---- transactions ----

    /// Generate the polynomial and publish its verification vector and shares.
    pub async fn broadcast(&mut self) -> DkgResult<Submission> {
        if self.keys.generate_dkg_poly(&self.poly_name).await? == PolyStatus::Fail {
            return Err(DkgError::PolynomialGeneration {
                group: self.group_name.clone(),
            });
        }

        let possible = self
            .ledger
            .is_broadcast_possible(&self.group, self.node_id)
            .await?;
        let gate = self.gate(possible).await?;
        if !gate.is_open() {
            tracing::info!(group = %self.group_name, index = self.index, ?gate, "node could not send broadcast");
            return Ok(Submission::Skipped(gate));
        }

        let vector = self.keys.verification_vector(&self.poly_name).await?;
        let contribution = self
            .keys
            .secret_key_contribution(&self.poly_name, &self.public_keys)
            .await?;
        let shares = wire::key_shares_from_native(&contribution, self.n)?;
        let start = RECORD_HEX_LEN * self.index;
        let own_record = contribution
            .get(start..start + RECORD_HEX_LEN)
            .ok_or(WireError::TooShort {
                expected: start + RECORD_HEX_LEN,
                actual: contribution.len(),
            })?;
        self.incoming_contributions[self.index] = Some(wire::ledger_order_record(own_record));
        self.incoming_verification_vectors[self.index] = Some(wire::g2_points_to_hex(&vector));
        self.sent_contribution = Some(contribution);

        let receipt = self
            .ledger
            .broadcast(&self.group, self.node_id, &vector, &shares, self.rotation_id)
            .await
            .map_err(|e| self.transaction_error(e))?;
        self.advance_step(DkgStep::Broadcast);
        tracing::info!(group = %self.group_name, index = self.index, "everything is sent");
        Ok(Submission::Sent(receipt))
    }

    /// Attest that all data was received and verified.
    pub async fn alright(&mut self) -> DkgResult<Submission> {
        tracing::info!(group = %self.group_name, "sending alright transaction");
        let possible = self
            .ledger
            .is_alright_possible(&self.group, self.node_id)
            .await?;
        let gate = self.gate(possible).await?;
        if !gate.is_open() {
            tracing::info!(group = %self.group_name, index = self.index, ?gate, "node could not send an alright note");
            return Ok(Submission::Skipped(gate));
        }
        let receipt = self
            .ledger
            .alright(&self.group, self.node_id)
            .await
            .map_err(|e| self.transaction_error(e))?;
        self.advance_step(DkgStep::Alright);
        tracing::info!(group = %self.group_name, index = self.index, "node sent an alright note");
        Ok(Submission::Sent(receipt))
    }

    /// File a complaint against the member at `to`.
    ///
    /// Returns whether the ledger accepted it. A complaint the contract
    /// rejects shows up as a `ComplaintError` log; a bad-data complaint is
    /// also confirmed against the ledger's complaint record.
    pub async fn send_complaint(&mut self, to: usize, reason: ComplaintReason) -> DkgResult<bool> {
        let Some(target) = self.node_id_at(to) else {
            return Ok(false);
        };
        tracing::info!(
            group = %self.group_name,
            index = self.index,
            target = to,
            %reason,
            "trying to send a complaint"
        );

        let possible = self
            .ledger
            .is_complaint_possible(&self.group, self.node_id, target)
            .await?;
        let gate = self.gate(possible).await?;
        if !gate.is_open() {
            tracing::info!(group = %self.group_name, index = self.index, target = to, ?gate, "node could not send a complaint");
            return Ok(false);
        }

        let receipt = match reason {
            ComplaintReason::BadData => {
                self.ledger
                    .complaint_bad_data(&self.group, self.node_id, target)
                    .await
            }
            _ => self.ledger.complaint(&self.group, self.node_id, target).await,
        }
        .map_err(|e| self.transaction_error(e))?;

        if !self.is_complaint_logged(&receipt) {
            tracing::info!(group = %self.group_name, index = self.index, target = to, "complaint was rejected");
            return Ok(false);
        }
        if reason == ComplaintReason::BadData {
            let data = self.complaint_data().await?;
            if data.accuser != self.node_id || data.accused != target {
                tracing::info!(
                    group = %self.group_name,
                    target = to,
                    ?data,
                    "bad data complaint is not on record"
                );
                return Ok(false);
            }
        }

        tracing::info!(group = %self.group_name, index = self.index, target = to, %reason, "node sent a complaint");
        self.advance_step(reason.step());
        Ok(true)
    }

    fn is_complaint_logged(&self, receipt: &TxReceipt) -> bool {
        receipt
            .logs
            .first()
            .and_then(|log| log.topics.first())
            .is_some_and(|topic| *topic != self.complaint_error_topic)
    }

    /// Answer a bad-data complaint filed by `accuser`: pre-response, then
    /// response. Each half is gated separately.
    pub async fn respond(&mut self, accuser: NodeId) -> DkgResult<Submission> {
        let accuser_index = self.index_of(accuser).ok_or_else(|| {
            DkgError::Ledger(LedgerError::not_found(format!(
                "accuser {accuser} is not a member of {}",
                self.group_name
            )))
        })?;

        let possible = self
            .ledger
            .is_pre_response_possible(&self.group, self.node_id)
            .await?;
        let gate = self.gate(possible).await?;
        if !gate.is_open() {
            tracing::info!(group = %self.group_name, index = self.index, ?gate, "node could not send a response");
            return Ok(Submission::Skipped(gate));
        }

        let response = self
            .keys
            .complaint_response(&self.poly_name, accuser_index)
            .await?;
        let vector = self.own_verification_vector()?;
        let sent = self
            .sent_contribution
            .as_deref()
            .ok_or_else(|| DkgError::missing_data(&self.group_name, "own secret key contribution"))?;
        let shares = wire::key_shares_from_native(sent, self.n)?;

        self.ledger
            .pre_response(
                &self.group,
                self.node_id,
                &vector,
                &response.verification_vector_mult,
                &shares,
            )
            .await
            .map_err(|e| self.transaction_error(e))?;
        self.advance_step(DkgStep::PreResponse);

        let possible = self
            .ledger
            .is_response_possible(&self.group, self.node_id)
            .await?;
        let gate = self.gate(possible).await?;
        if !gate.is_open() {
            tracing::info!(group = %self.group_name, index = self.index, ?gate, "node could not send a response");
            return Ok(Submission::Skipped(gate));
        }

        let dh_key = H256::from_hex(&response.dh_key)?;
        let receipt = self
            .ledger
            .response(&self.group, self.node_id, dh_key, response.share)
            .await
            .map_err(|e| self.transaction_error(e))?;
        self.advance_step(DkgStep::Response);
        tracing::info!(group = %self.group_name, index = self.index, "node sent a response");
        Ok(Submission::Sent(receipt))
    }

    fn own_verification_vector(&self) -> DkgResult<Vec<G2Point>> {
        let hex = self.incoming_verification_vectors[self.index]
            .as_deref()
            .ok_or_else(|| DkgError::missing_data(&self.group_name, "own verification vector"))?;
        Ok(wire::g2_points_from_hex(hex)?)
    }

    // ---- key assembly ----

    /// Whether the key service already holds this session's BLS key
    pub async fn is_bls_key_generated(&self) -> DkgResult<bool> {
        self.keys.has_bls_key(&self.bls_name).await
    }

    /// Create the BLS private key from every received share, in member
    /// order, then fetch its public key. Returns the encrypted private key.
    pub async fn generate_bls_key(&mut self) -> DkgResult<String> {
        let shares = self
            .incoming_contributions
            .iter()
            .enumerate()
            .map(|(i, record)| {
                record
                    .as_deref()
                    .map(wire::reorder_share_record)
                    .ok_or_else(|| {
                        DkgError::missing_data(&self.group_name, format!("share from node {i}"))
                    })
            })
            .collect::<DkgResult<String>>()?;
        tracing::info!(group = %self.group_name, bls_name = %self.bls_name, "creating BLS private key");
        let encrypted = self
            .keys
            .create_bls_private_key(&self.poly_name, &self.bls_name, &self.eth_key_name, &shares)
            .await?;
        self.fetch_bls_public_key().await?;
        Ok(encrypted)
    }

    /// Load this node's BLS public key from the key service
    pub async fn fetch_bls_public_key(&mut self) -> DkgResult<()> {
        self.public_key = Some(self.keys.bls_public_key(&self.bls_name).await?);
        Ok(())
    }

    /// BLS public keys of every member, from all verification vectors
    pub async fn bls_public_keys(&self) -> DkgResult<Vec<Vec<String>>> {
        let vectors = self
            .incoming_verification_vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| {
                vector.clone().ok_or_else(|| {
                    DkgError::missing_data(
                        &self.group_name,
                        format!("verification vector from node {i}"),
                    )
                })
            })
            .collect::<DkgResult<Vec<String>>>()?;
        self.keys.calculate_all_bls_public_keys(&vectors).await
    }
}

impl std::fmt::Debug for DkgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DkgSession")
            .field("group_name", &self.group_name)
            .field("node_id", &self.node_id)
            .field("index", &self.index)
            .field("t", &self.t)
            .field("n", &self.n)
            .field("last_completed_step", &self.last_completed_step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::RetryPolicy;
    use quorum_testkit::{roster_nodes, MockKeyService, MockLedger, StaticRoster};
    use std::time::Duration;

    async fn session(node: usize) -> DkgSession {
        session_with(node, Arc::new(MockKeyService::new(4))).await
    }

    async fn session_with(node: usize, key_service: Arc<MockKeyService>) -> DkgSession {
        let nodes = roster_nodes(4);
        let ledger = Arc::new(MockLedger::new(300));
        ledger.open_channel("alpha", &nodes.iter().map(|n| n.id).collect::<Vec<_>>());
        let roster = StaticRoster::new().with_group("alpha", nodes.clone());
        let keys = KeyServiceClient::new(
            key_service,
            RetryPolicy::unbounded_fixed(Duration::from_secs(1)),
        );
        DkgSession::init(
            &SessionRequest::new("alpha", nodes[node].id, 0),
            "NEK:test",
            &roster,
            ledger,
            keys,
            PollTimer::detached(Duration::from_secs(30)),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_key_names() {
        let group = GroupId(H256::from_u64(255));
        assert_eq!(poly_name(&group, 2, 7), "POLY:SCHAIN_ID:255:NODE_ID:2:DKG_ID:7");
        assert_eq!(
            bls_key_name(&group, 0, 1),
            "BLS_KEY:SCHAIN_ID:255:NODE_ID:0:DKG_ID:1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_resolves_index_and_threshold() {
        let session = session(2).await;
        assert_eq!(session.index(), 2);
        assert_eq!((session.t(), session.n()), (3, 4));
        assert_eq!(session.dkg_timeout(), 300);
        assert_eq!(session.index_of(session.node_id()), Some(2));
        assert!(session.poly_name().ends_with(":NODE_ID:2:DKG_ID:0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_rejects_missing_node_and_empty_record() {
        let nodes = roster_nodes(3);
        let ledger = Arc::new(MockLedger::new(300));
        ledger.open_channel("beta", &nodes.iter().map(|n| n.id).collect::<Vec<_>>());
        let keys = KeyServiceClient::new(
            Arc::new(MockKeyService::new(3)),
            RetryPolicy::unbounded_fixed(Duration::from_secs(1)),
        );
        let timer = PollTimer::detached(Duration::from_secs(30));

        let roster = StaticRoster::new().with_group("beta", nodes.clone());
        let err = DkgSession::init(
            &SessionRequest::new("beta", NodeId(9999), 0),
            "k",
            &roster,
            ledger.clone(),
            keys.clone(),
            timer.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DkgError::Initialization { .. }));

        let mut broken = nodes.clone();
        broken[1].public_key.clear();
        let roster = StaticRoster::new().with_group("beta", broken);
        let err = DkgSession::init(
            &SessionRequest::new("beta", nodes[0].id, 0),
            "k",
            &roster,
            ledger,
            keys,
            timer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DkgError::Initialization { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_never_moves_backwards() {
        let mut session = session(0).await;
        session.advance_step(DkgStep::Alright);
        session.advance_step(DkgStep::Broadcast);
        assert_eq!(session.last_completed_step(), DkgStep::Alright);
        session.advance_step(DkgStep::KeyGeneration);
        assert_eq!(session.last_completed_step(), DkgStep::KeyGeneration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_keeps_record_addressed_to_this_node() {
        let mut session = session(1).await;
        let records: String = (0..4)
            .map(|i| format!("{}{i:064x}", "a".repeat(128)))
            .collect();
        let event = BroadcastEvent {
            node_id: session.node_id_at(3).unwrap(),
            verification_vector: "0".repeat(3 * 256),
            secret_key_contribution: records,
        };
        session.store_broadcast_data(3, &event).unwrap();
        assert_eq!(
            session.incoming_contributions[3].as_deref(),
            Some(format!("{}{:064x}", "a".repeat(128), 1).as_str())
        );
        assert!(session.sent_contribution.is_none());

        session.store_broadcast_data(1, &event).unwrap();
        let sent = session.sent_contribution.clone().unwrap();
        assert_eq!(&sent[..64], &format!("{:064x}", 0));
        assert_eq!(&sent[64..192], &"a".repeat(128));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_share_is_a_verification_failure() {
        let key_service = Arc::new(MockKeyService::new(4));
        key_service.reject_next_verifications(1);
        let mut session = session_with(1, key_service).await;
        let event = BroadcastEvent {
            node_id: session.node_id_at(3).unwrap(),
            verification_vector: "0".repeat(3 * 256),
            secret_key_contribution: "f".repeat(4 * 192),
        };
        let err = session.receive_from_node(3, &event).await.unwrap_err();
        assert_eq!(
            err,
            DkgError::Verification {
                group: "alpha".to_string(),
                from: 4,
                by: 2,
            }
        );
        assert!(session.incoming_contributions[3].is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_data_does_not_verify() {
        let session = session(0).await;
        assert!(!session.verify(2).await.unwrap());
    }
}
