//! Committee fixture: one shared ledger and roster, one key service per node.

use crate::key_service::MockKeyService;
use crate::ledger::MockLedger;
use crate::roster::{roster_nodes, StaticRoster};
use quorum_core::{NodeId, RosterNode};
use std::sync::Arc;

/// A group whose channel is open on a fresh ledger.
pub struct Committee {
    pub group_name: String,
    pub ledger: Arc<MockLedger>,
    pub roster: Arc<StaticRoster>,
    pub nodes: Vec<RosterNode>,
    /// Key service of the node at the same position in `nodes`
    pub key_services: Vec<Arc<MockKeyService>>,
}

impl Committee {
    pub fn new(group_name: &str, n: usize, dkg_timeout: u64) -> Self {
        let ledger = Arc::new(MockLedger::new(dkg_timeout));
        let nodes = roster_nodes(n);
        let roster = Arc::new(StaticRoster::new().with_group(group_name, nodes.clone()));
        let key_services = (0..n).map(|_| Arc::new(MockKeyService::new(n))).collect();
        let committee = Self {
            group_name: group_name.to_string(),
            ledger,
            roster,
            nodes,
            key_services,
        };
        committee
            .ledger
            .open_channel(group_name, &committee.member_ids());
        committee
    }

    /// Ledger id of the member at `index`
    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index].id
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn n(&self) -> usize {
        self.nodes.len()
    }
}
