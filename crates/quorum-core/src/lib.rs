//! # Quorum Core
//!
//! Shared vocabulary for running distributed key generation over a ledger:
//!
//! - **types**: identifiers and ledger values (`GroupId`, `NodeId`, `G2Point`,
//!   `TxReceipt`, `ComplaintData`, ...)
//! - **dkg**: protocol steps, statuses, complaint reasons, the `KeyBundle`
//! - **wire**: fixed hex layout of broadcast payloads and share records
//! - **effects**: traits for the ledger channel, secure key service and roster
//! - **reliability**: retry policy applied at collaborator boundaries
//! - **errors**: collaborator error types

pub mod dkg;
pub mod effects;
pub mod errors;
pub mod reliability;
pub mod types;
pub mod wire;

pub use dkg::{threshold_for, ComplaintReason, DkgStatus, DkgStep, KeyBundle};
pub use effects::{ComplaintResponse, GroupRoster, LedgerChannel, PolyStatus, SecureKeyService};
pub use errors::{
    KeyServiceError, KeyServiceResult, LedgerError, LedgerResult, StorageError, WireError,
};
pub use reliability::RetryPolicy;
pub use types::{
    Address, Block, ComplaintData, G2Point, GroupId, KeyShare, LogEntry, NodeId, RosterNode,
    Transaction, TxHash, TxReceipt, H256,
};
