//! Ledger channel: the ordered broadcast substrate of the DKG.
//!
//! Three groups of operations:
//!
//! - **Chain access**: blocks, receipts and the DKG contract address, used by
//!   the event scanner.
//! - **Channel state**: read-only views of the on-ledger DKG channel of a group,
//!   including the `*_possible` gates that tell whether a transaction would be
//!   accepted right now.
//! - **Transactions**: one method per DKG transaction, each returning the mined
//!   receipt. Submission or execution failures are reported as
//!   `LedgerError::TransactionFailed` / `LedgerError::Reverted`.

use crate::errors::LedgerResult;
use crate::types::{
    Address, Block, ComplaintData, G2Point, GroupId, KeyShare, NodeId, TxHash, TxReceipt, H256,
};
use async_trait::async_trait;

/// Ledger surface consumed by the DKG core.
#[async_trait]
pub trait LedgerChannel: Send + Sync {
    // ---- chain access ----

    /// Address of the DKG channel contract
    fn dkg_contract_address(&self) -> Address;

    /// Most recent block header (transactions may be omitted)
    async fn latest_block(&self) -> LedgerResult<Block>;

    /// Block with its transactions
    async fn block(&self, number: u64) -> LedgerResult<Block>;

    /// Receipt of a mined transaction; `ReceiptNotFound` while pending
    async fn transaction_receipt(&self, tx_hash: TxHash) -> LedgerResult<TxReceipt>;

    /// DKG phase timeout in seconds of ledger time
    async fn dkg_timeout(&self) -> LedgerResult<u64>;

    // ---- channel state ----

    /// Channel is accepting DKG transactions
    async fn is_channel_opened(&self, group: &GroupId) -> LedgerResult<bool>;

    /// Ledger timestamp at which the current channel was opened
    async fn channel_started_time(&self, group: &GroupId) -> LedgerResult<u64>;

    /// Block at which the current channel was opened
    async fn channel_started_block(&self, group: &GroupId) -> LedgerResult<u64>;

    /// Ledger timestamp at which the alright phase began
    async fn alright_started_time(&self, group: &GroupId) -> LedgerResult<u64>;

    /// Last DKG of this group ended in success
    async fn is_last_dkg_successful(&self, group: &GroupId) -> LedgerResult<bool>;

    /// `node` has broadcast in the current channel
    async fn is_node_broadcasted(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    /// Every member has broadcast
    async fn is_everyone_broadcasted(&self, group: &GroupId) -> LedgerResult<bool>;

    /// `node` has sent alright
    async fn is_all_data_received(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    /// Number of members that have sent alright
    async fn number_of_completed(&self, group: &GroupId) -> LedgerResult<u64>;

    /// Outstanding complaint, or the sentinel pair
    async fn complaint_data(&self, group: &GroupId) -> LedgerResult<ComplaintData>;

    /// Group public key after a successful DKG
    async fn common_public_key(&self, group: &GroupId) -> LedgerResult<G2Point>;

    // ---- transaction gates ----

    /// A broadcast from `node` would be accepted
    async fn is_broadcast_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    /// An alright from `node` would be accepted
    async fn is_alright_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    /// A complaint from `from` against `to` would be accepted
    async fn is_complaint_possible(
        &self,
        group: &GroupId,
        from: NodeId,
        to: NodeId,
    ) -> LedgerResult<bool>;

    /// A pre-response from `node` would be accepted
    async fn is_pre_response_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    /// A response from `node` would be accepted
    async fn is_response_possible(&self, group: &GroupId, node: NodeId) -> LedgerResult<bool>;

    // ---- transactions ----

    /// Publish verification vector and per-recipient shares
    async fn broadcast(
        &self,
        group: &GroupId,
        node: NodeId,
        verification_vector: &[G2Point],
        secret_key_contribution: &[KeyShare],
        rotation_id: u64,
    ) -> LedgerResult<TxReceipt>;

    /// Attest that all data was received and verified
    async fn alright(&self, group: &GroupId, node: NodeId) -> LedgerResult<TxReceipt>;

    /// Complain about a missing broadcast, alright or response
    async fn complaint(&self, group: &GroupId, from: NodeId, to: NodeId)
        -> LedgerResult<TxReceipt>;

    /// Complain about data that failed verification
    async fn complaint_bad_data(
        &self,
        group: &GroupId,
        from: NodeId,
        to: NodeId,
    ) -> LedgerResult<TxReceipt>;

    /// First half of the answer to a bad-data complaint
    async fn pre_response(
        &self,
        group: &GroupId,
        node: NodeId,
        verification_vector: &[G2Point],
        verification_vector_mult: &[G2Point],
        secret_key_contribution: &[KeyShare],
    ) -> LedgerResult<TxReceipt>;

    /// Second half of the answer to a bad-data complaint
    async fn response(
        &self,
        group: &GroupId,
        node: NodeId,
        dh_key: H256,
        share: G2Point,
    ) -> LedgerResult<TxReceipt>;
}
