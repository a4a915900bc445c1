//! Incremental scanner for broadcast events of one group.
//!
//! Walks the chain from a cursor to the current head, keeps transactions sent
//! to the DKG contract whose first log carries the broadcast signature and the
//! group topic, and decodes their payload. The cursor only moves forward, past
//! the last block fully examined.

use quorum_core::wire::{decode_broadcast_payload, BROADCAST_EVENT_SIGNATURE};
use quorum_core::{GroupId, LedgerChannel, LedgerError, LedgerResult, NodeId, TxReceipt};
use std::sync::Arc;

/// Decoded broadcast of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    /// Ledger id of the broadcaster
    pub node_id: NodeId,
    /// `t` encoded points, wire hex
    pub verification_vector: String,
    /// `n` ledger-order share records, wire hex
    pub secret_key_contribution: String,
}

/// Broadcast event scanner bound to one group channel.
pub struct BroadcastScanner {
    ledger: Arc<dyn LedgerChannel>,
    group: GroupId,
    t: usize,
    n: usize,
    first_unseen_block: Option<u64>,
}

impl BroadcastScanner {
    /// Scanner that has not seen any block yet
    pub fn new(ledger: Arc<dyn LedgerChannel>, group: GroupId, n: usize) -> Self {
        Self {
            ledger,
            group,
            t: quorum_core::threshold_for(n),
            n,
            first_unseen_block: None,
        }
    }

    /// Next block a normal scan starts from, once initialized
    pub fn cursor(&self) -> Option<u64> {
        self.first_unseen_block
    }

    /// Scan new blocks. With `from_channel_started_block` the scan restarts at
    /// the block where the channel was opened.
    ///
    /// Never fails: a ledger error ends the scan early and the events found
    /// before it are returned, with the cursor left after the last complete
    /// block.
    pub async fn get_events(&mut self, from_channel_started_block: bool) -> Vec<BroadcastEvent> {
        let mut events = Vec::new();
        if let Err(err) = self.scan(from_channel_started_block, &mut events).await {
            tracing::info!(group = %self.group, error = %err, "error during collecting broadcast events");
        }
        events
    }

    async fn scan(
        &mut self,
        from_channel_started_block: bool,
        events: &mut Vec<BroadcastEvent>,
    ) -> LedgerResult<()> {
        let start_block = match self.first_unseen_block {
            Some(cursor) if !from_channel_started_block => cursor,
            _ => self.ledger.channel_started_block(&self.group).await?,
        };
        let current_block = self.ledger.latest_block().await?.number;
        tracing::info!(
            group = %self.group,
            start_block,
            current_block,
            "parsing broadcast events"
        );

        let dkg_address = self.ledger.dkg_contract_address();
        for number in start_block..=current_block {
            let block = self.ledger.block(number).await?;
            for tx in &block.transactions {
                if tx.to != Some(dkg_address) {
                    continue;
                }
                let receipt = match self.ledger.transaction_receipt(tx.hash).await {
                    Ok(receipt) => receipt,
                    Err(LedgerError::ReceiptNotFound { .. }) => continue,
                    Err(err) => return Err(err),
                };
                if let Some(event) = self.parse_event(&receipt) {
                    events.push(event);
                }
            }
            self.advance_cursor(number + 1);
        }
        Ok(())
    }

    fn advance_cursor(&mut self, next: u64) {
        self.first_unseen_block = Some(self.first_unseen_block.map_or(next, |c| c.max(next)));
    }

    fn parse_event(&self, receipt: &TxReceipt) -> Option<BroadcastEvent> {
        let log = receipt.logs.first()?;
        if log.topics.len() < 3 {
            return None;
        }
        if log.topics[0] != BROADCAST_EVENT_SIGNATURE || log.topics[1] != self.group.as_topic() {
            return None;
        }
        if log.data.is_empty() {
            tracing::info!(group = %self.group, tx = %receipt.tx_hash, "broadcast log has no data");
            return None;
        }
        let node_id = NodeId(log.topics[2].to_u64()?);
        match decode_broadcast_payload(&hex::encode(&log.data), self.t, self.n) {
            Ok(payload) => Some(BroadcastEvent {
                node_id,
                verification_vector: payload.verification_vector,
                secret_key_contribution: payload.secret_key_contribution,
            }),
            Err(err) => {
                tracing::warn!(group = %self.group, tx = %receipt.tx_hash, error = %err, "undecodable broadcast payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::wire::payload_hex_len;
    use quorum_core::{Address, LogEntry, H256};
    use quorum_testkit::MockLedger;

    fn scanner(ledger: Arc<MockLedger>) -> BroadcastScanner {
        BroadcastScanner::new(ledger, GroupId::from_name("scan-test"), 4)
    }

    fn receipt(topics: Vec<H256>, data: Vec<u8>) -> TxReceipt {
        TxReceipt {
            tx_hash: H256::from_u64(1),
            block_number: 1,
            status: true,
            logs: vec![LogEntry {
                address: Address::default(),
                topics,
                data,
            }],
        }
    }

    #[test]
    fn test_parse_event_filters_by_signature_and_group() {
        let scanner = scanner(Arc::new(MockLedger::new(300)));
        let data = vec![0u8; payload_hex_len(3, 4) / 2];
        let group_topic = scanner.group.as_topic();

        let ok = receipt(
            vec![BROADCAST_EVENT_SIGNATURE, group_topic, H256::from_u64(7)],
            data.clone(),
        );
        let event = scanner.parse_event(&ok).unwrap();
        assert_eq!(event.node_id, NodeId(7));
        assert_eq!(event.verification_vector.len(), 3 * 256);
        assert_eq!(event.secret_key_contribution.len(), 4 * 192);

        let other_group = receipt(
            vec![
                BROADCAST_EVENT_SIGNATURE,
                GroupId::from_name("other").as_topic(),
                H256::from_u64(7),
            ],
            data.clone(),
        );
        assert!(scanner.parse_event(&other_group).is_none());

        let other_event = receipt(vec![H256::ZERO, group_topic, H256::from_u64(7)], data.clone());
        assert!(scanner.parse_event(&other_event).is_none());

        let short = receipt(
            vec![BROADCAST_EVENT_SIGNATURE, group_topic, H256::from_u64(7)],
            data[..10].to_vec(),
        );
        assert!(scanner.parse_event(&short).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_ledger_yields_nothing_and_keeps_cursor() {
        let ledger = Arc::new(MockLedger::new(300));
        ledger.set_unavailable(true);
        let mut scanner = scanner(ledger);
        assert!(scanner.get_events(false).await.is_empty());
        assert_eq!(scanner.cursor(), None);
    }
}
