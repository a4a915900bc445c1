//! Fixed group membership.

use async_trait::async_trait;
use quorum_core::{GroupRoster, LedgerError, LedgerResult, NodeId, RosterNode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// First node id handed out by [`roster_nodes`]
pub const FIRST_NODE_ID: u64 = 100;

/// `n` members with ids starting at [`FIRST_NODE_ID`] and distinct
/// 64-byte public keys.
pub fn roster_nodes(n: usize) -> Vec<RosterNode> {
    (0..n as u64)
        .map(|i| {
            let id = NodeId(FIRST_NODE_ID + i);
            let x = Sha256::digest(format!("node-{}-x", id.0));
            let y = Sha256::digest(format!("node-{}-y", id.0));
            RosterNode {
                id,
                public_key: format!("{}{}", hex::encode(x), hex::encode(y)),
            }
        })
        .collect()
}

/// Roster backed by a map of group name to members.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    groups: HashMap<String, Vec<RosterNode>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the members of a group
    pub fn with_group(mut self, group_name: &str, nodes: Vec<RosterNode>) -> Self {
        self.groups.insert(group_name.to_string(), nodes);
        self
    }
}

#[async_trait]
impl GroupRoster for StaticRoster {
    async fn group_nodes(&self, group_name: &str) -> LedgerResult<Vec<RosterNode>> {
        self.groups
            .get(group_name)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("group {group_name}")))
    }
}
