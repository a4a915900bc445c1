//! Quorum Testing Infrastructure
//!
//! In-memory collaborators for driving DKG sessions in tests: a simulated
//! ledger channel with the contract's phase rules, a deterministic key
//! service, a static roster and a committee fixture tying them together.
//! Ledger time follows tokio time, so tests on a paused clock run through
//! DKG timeouts without waiting.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod key_service;
pub mod ledger;
pub mod roster;
pub mod scenario;

pub use key_service::{expected_share, MockKeyService};
pub use ledger::{MockLedger, DKG_CONTRACT, GENESIS_TIMESTAMP};
pub use roster::{roster_nodes, StaticRoster, FIRST_NODE_ID};
pub use scenario::Committee;

/// Install a test log subscriber honoring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
