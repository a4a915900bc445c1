//! Interfaces of the external collaborators.
//!
//! The DKG core never talks to a blockchain node, a key-management server or
//! a roster service directly. Each is reached through one of these traits, so
//! production adapters and the in-memory simulations in `quorum-testkit` are
//! interchangeable.
//!
//! - `LedgerChannel`: ordered event log plus the DKG channel contract surface
//! - `SecureKeyService`: polynomial, share and BLS key operations
//! - `GroupRoster`: ordered membership of a group

pub mod key_service;
pub mod ledger;
pub mod roster;

pub use key_service::{ComplaintResponse, PolyStatus, SecureKeyService};
pub use ledger::LedgerChannel;
pub use roster::GroupRoster;
