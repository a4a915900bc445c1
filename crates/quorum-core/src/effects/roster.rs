//! Group membership lookup.

use crate::errors::LedgerResult;
use crate::types::RosterNode;
use async_trait::async_trait;

/// Resolves the ordered member list of a group.
#[async_trait]
pub trait GroupRoster: Send + Sync {
    /// Members of `group_name` in protocol order
    async fn group_nodes(&self, group_name: &str) -> LedgerResult<Vec<RosterNode>>;
}

