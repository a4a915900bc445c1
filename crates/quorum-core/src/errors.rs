//! Error types for the external collaborators.
//!
//! Each collaborator (ledger, key service, key-bundle storage) reports its own
//! error enum so callers can branch on the failure class.

use serde::{Deserialize, Serialize};

/// Failures reported by the ledger channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum LedgerError {
    /// Ledger endpoint could not be reached
    #[error("Ledger unavailable: {message}")]
    Unavailable {
        /// Transport-level description
        message: String,
    },

    /// Receipt for the transaction is not available (yet)
    #[error("Receipt not found: {tx_hash}")]
    ReceiptNotFound {
        /// Hex hash of the transaction
        tx_hash: String,
    },

    /// Transaction could not be submitted or mined
    #[error("Transaction failed: {message}")]
    TransactionFailed {
        /// Failure description
        message: String,
    },

    /// Contract reverted the transaction
    #[error("Transaction reverted: {message}")]
    Reverted {
        /// Revert reason
        message: String,
    },

    /// Requested entity does not exist on the ledger
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// Anything else
    #[error("Ledger internal error: {message}")]
    Internal {
        /// Failure description
        message: String,
    },
}

impl LedgerError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a transaction failure
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            message: message.into(),
        }
    }

    /// Create a revert error
    pub fn reverted(message: impl Into<String>) -> Self {
        Self::Reverted {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the failure happened at transaction submission or execution.
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, Self::TransactionFailed { .. } | Self::Reverted { .. })
    }
}

/// Failures reported by the secure key service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum KeyServiceError {
    /// Service unreachable; always retried by the client boundary
    #[error("Key service unreachable: {message}")]
    Unreachable {
        /// Transport-level description
        message: String,
    },

    /// Named key or polynomial does not exist
    #[error("Key service data not found: {name}")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// Service answered with an error
    #[error("Key service error: {message}")]
    Server {
        /// Server-provided message
        message: String,
    },
}

impl KeyServiceError {
    /// Create an unreachable error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a server error
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Transient failures are retried rather than surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// Failures of the key-bundle store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failure
    #[error("Storage I/O error: {message}")]
    Io {
        /// Failure description
        message: String,
    },

    /// Stored data could not be (de)serialized
    #[error("Storage serialization error: {message}")]
    Serialization {
        /// Failure description
        message: String,
    },

    /// No bundle stored under the key
    #[error("Key bundle not found: {key}")]
    NotFound {
        /// Storage key
        key: String,
    },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Wire payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WireError {
    /// Input shorter than the fixed layout requires
    #[error("Payload too short: expected at least {expected} hex chars, got {actual}")]
    TooShort {
        /// Required length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Input is not valid hex
    #[error("Invalid hex: {message}")]
    InvalidHex {
        /// Failure description
        message: String,
    },

    /// Input length is not a multiple of the record width
    #[error("Misaligned record data: {len} is not a multiple of {width}")]
    Misaligned {
        /// Input length
        len: usize,
        /// Record width
        width: usize,
    },
}

/// Result alias for ledger calls
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Result alias for key service calls
pub type KeyServiceResult<T> = std::result::Result<T, KeyServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_failure_classification() {
        assert!(LedgerError::reverted("bad").is_transaction_failure());
        assert!(LedgerError::transaction_failed("gas").is_transaction_failure());
        assert!(!LedgerError::unavailable("down").is_transaction_failure());
    }

    #[test]
    fn test_only_unreachable_is_transient() {
        assert!(KeyServiceError::unreachable("refused").is_transient());
        assert!(!KeyServiceError::not_found("BLS_KEY").is_transient());
        assert!(!KeyServiceError::server("boom").is_transient());
    }
}
