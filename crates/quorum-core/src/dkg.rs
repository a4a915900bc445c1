//! DKG protocol vocabulary shared by the node and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Threshold for a committee of `n`: `floor((2n + 1) / 3)`.
pub fn threshold_for(n: usize) -> usize {
    (2 * n + 1) / 3
}

/// Terminal and intermediate status of one DKG attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DkgStatus {
    /// Nothing attempted yet
    NotStarted,
    /// Protocol run in flight
    InProgress,
    /// Key bundle produced
    Done,
    /// Group-wide failure or local protocol failure
    Failed,
    /// Protocol succeeded but local key derivation failed
    KeyGenerationError,
}

impl DkgStatus {
    /// Whether the attempt produced a key bundle
    pub fn is_done(&self) -> bool {
        *self == DkgStatus::Done
    }
}

/// Last completed protocol step. Ordering follows protocol progress; a
/// session only ever moves forward through these values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum DkgStep {
    /// Nothing done
    #[default]
    None,
    /// Own broadcast is on the ledger
    Broadcast,
    /// Everyone's broadcast checked
    BroadcastVerification,
    /// Alright sent
    Alright,
    /// Collecting alright notes from the others
    AlrightReceiving,
    /// Filed a complaint for a missing broadcast
    ComplaintNoBroadcast,
    /// Filed a complaint for bad data
    ComplaintBadData,
    /// Filed a complaint for a missing alright
    ComplaintNoAlright,
    /// Filed a complaint for a missing response
    ComplaintNoResponse,
    /// Pre-response sent
    PreResponse,
    /// Response sent
    Response,
    /// Key bundle assembled
    KeyGeneration,
    /// Key assembly failed; absorbing
    KeyGenerationError,
}

impl DkgStep {
    /// Numeric index reported in logs
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for DkgStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reason attached to a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplaintReason {
    /// Accused never broadcast
    NoBroadcast,
    /// Accused broadcast data that failed verification
    BadData,
    /// Accused never sent alright
    NoAlright,
    /// Accused never answered a bad-data complaint
    NoResponse,
}

impl ComplaintReason {
    /// Step recorded after the complaint is accepted
    pub fn step(&self) -> DkgStep {
        match self {
            ComplaintReason::NoBroadcast => DkgStep::ComplaintNoBroadcast,
            ComplaintReason::BadData => DkgStep::ComplaintBadData,
            ComplaintReason::NoAlright => DkgStep::ComplaintNoAlright,
            ComplaintReason::NoResponse => DkgStep::ComplaintNoResponse,
        }
    }

    /// What the accused failed to deliver, used while waiting for the outcome
    pub fn missing(&self) -> &'static str {
        match self {
            ComplaintReason::NoBroadcast => "broadcast",
            ComplaintReason::BadData => "correct data",
            ComplaintReason::NoAlright => "alright",
            ComplaintReason::NoResponse => "response",
        }
    }
}

impl fmt::Display for ComplaintReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful DKG, consumed by the workload using the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Group public key, coordinates flattened in order
    pub common_public_key: Vec<String>,
    /// This node's BLS public key
    pub public_key: Vec<String>,
    /// BLS public key of every participant, by index
    pub bls_public_keys: Vec<Vec<String>>,
    /// Threshold
    pub t: usize,
    /// Committee size
    pub n: usize,
    /// Name of this node's key share in the key service
    pub key_share_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_table() {
        let table = [(1, 1), (2, 1), (3, 2), (4, 3), (7, 5), (16, 11)];
        for (n, t) in table {
            assert_eq!(threshold_for(n), t, "n = {n}");
        }
    }

    #[test]
    fn test_step_order_follows_protocol() {
        assert!(DkgStep::None < DkgStep::Broadcast);
        assert!(DkgStep::Broadcast < DkgStep::BroadcastVerification);
        assert!(DkgStep::BroadcastVerification < DkgStep::Alright);
        assert!(DkgStep::Alright < DkgStep::Response);
        assert!(DkgStep::Response < DkgStep::KeyGeneration);
        assert!(DkgStep::KeyGeneration < DkgStep::KeyGenerationError);
    }

    #[test]
    fn test_complaint_reason_steps() {
        assert_eq!(ComplaintReason::BadData.step(), DkgStep::ComplaintBadData);
        assert_eq!(ComplaintReason::NoAlright.missing(), "alright");
    }

    #[test]
    fn test_status_done() {
        assert!(DkgStatus::Done.is_done());
        assert!(!DkgStatus::KeyGenerationError.is_done());
    }
}
