//! DKG error taxonomy and branch-based outcomes.
//!
//! "Not ready" is never an error here: precondition checks return a [`Gate`]
//! and transactions return a [`Submission`]. Errors are reserved for
//! failures: local ones that drive complaints, group-fatal ones that end the
//! run, and key assembly failures that only affect this node.

use quorum_core::{KeyServiceError, LedgerError, StorageError, TxReceipt, WireError};

/// Errors raised by the DKG core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DkgError {
    /// Session could not be set up from the roster
    #[error("sChain {group}: initialization failed: {message}")]
    Initialization {
        /// Group name
        group: String,
        /// Failure description
        message: String,
    },

    /// A participant's share did not pass verification
    #[error("sChain {group}: user {from} hasn't passed verification by user {by}")]
    Verification {
        /// Group name
        group: String,
        /// Sender index (1-based, as logged)
        from: usize,
        /// Verifier index (1-based, as logged)
        by: usize,
    },

    /// A DKG transaction failed at the transport or contract level
    #[error("sChain {group}: transaction failed: {source}")]
    Transaction {
        /// Group name
        group: String,
        /// Ledger failure
        source: LedgerError,
    },

    /// Key service could not generate the polynomial
    #[error("sChain {group}: polynomial generation failed")]
    PolynomialGeneration {
        /// Group name
        group: String,
    },

    /// Group-wide failure: the ledger failed or restarted the DKG
    #[error("sChain {group}: DKG failed: {reason}")]
    Failed {
        /// Group name
        group: String,
        /// What was observed
        reason: String,
    },

    /// Key assembly failed after the protocol completed
    #[error("Key generation failed: {message}")]
    KeyGeneration {
        /// Failure description
        message: String,
    },

    /// Protocol data needed for this step was never received or produced
    #[error("sChain {group}: missing {what}")]
    MissingData {
        /// Group name
        group: String,
        /// What is missing
        what: String,
    },

    /// Alright phase ended with members unaccounted for
    #[error("sChain {group}: not everyone sent alright")]
    NotEveryoneSentAlright {
        /// Group name
        group: String,
    },

    /// Session was cancelled by its host
    #[error("DKG session cancelled")]
    Cancelled,

    /// Runtime configuration is invalid
    #[error("Invalid configuration: {message}")]
    Config {
        /// Failure description
        message: String,
    },

    /// Wire data could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Ledger query failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Key service failed with a non-transient error
    #[error(transparent)]
    KeyService(#[from] KeyServiceError),

    /// Key bundle could not be persisted
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DkgError {
    /// Create a group-fatal error
    pub fn failed(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            group: group.into(),
            reason: reason.into(),
        }
    }

    /// Create an initialization error
    pub fn initialization(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Initialization {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create a missing-data error
    pub fn missing_data(group: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingData {
            group: group.into(),
            what: what.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap any failure during key assembly
    pub fn key_generation(err: impl std::fmt::Display) -> Self {
        Self::KeyGeneration {
            message: err.to_string(),
        }
    }

    /// Errors that end the run for the whole group
    pub fn is_group_fatal(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result alias for DKG operations
pub type DkgResult<T> = std::result::Result<T, DkgError>;

/// State of a transaction precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Transaction would be accepted
    Open,
    /// Contract says the transaction is not possible now
    NotPossible,
    /// Channel is closed
    ChannelClosed,
}

impl Gate {
    /// Combine the contract's `*_possible` answer with the channel state
    pub fn from_checks(possible: bool, channel_opened: bool) -> Self {
        match (possible, channel_opened) {
            (_, false) => Gate::ChannelClosed,
            (false, true) => Gate::NotPossible,
            (true, true) => Gate::Open,
        }
    }

    /// Whether the transaction may be sent
    pub fn is_open(&self) -> bool {
        *self == Gate::Open
    }
}

/// Outcome of a gated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Transaction mined
    Sent(TxReceipt),
    /// Gate was closed; nothing sent
    Skipped(Gate),
}
