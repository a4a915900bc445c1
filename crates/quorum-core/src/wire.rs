//! Wire layout of DKG data on the ledger channel.
//!
//! A broadcast log carries, as lowercase hex without prefix:
//!
//! ```text
//! | header 192 | verification vector t*256 | gap 64 | shares n*192 |
//! ```
//!
//! Each share record on the ledger is `publicKey(128) + share(64)`. The key
//! service works with the other order, `share(64) + publicKey(128)`.

use crate::errors::WireError;
use crate::types::{G2Point, KeyShare, H256};

/// Fixed header preceding the verification vector
pub const HEADER_HEX_LEN: usize = 192;
/// Array-length word between vector and shares
pub const GAP_HEX_LEN: usize = 64;
/// One encoded G2 point
pub const POINT_HEX_LEN: usize = G2Point::HEX_LEN;
/// One per-recipient share record
pub const RECORD_HEX_LEN: usize = 192;

/// Topic 0 of the broadcast event emitted by the DKG contract.
pub const BROADCAST_EVENT_SIGNATURE: H256 = H256([
    0x47, 0xe5, 0x7a, 0x21, 0x3b, 0x52, 0xc1, 0xc1, 0x45, 0x50, 0xe5, 0x45, 0x6a, 0x6d, 0xcd, 0xbf,
    0x44, 0xbb, 0x6e, 0x87, 0xc0, 0x83, 0x2f, 0xdd, 0xe7, 0x8d, 0x99, 0x69, 0x77, 0xe6, 0x90, 0x4d,
]);

/// Event the contract logs when it rejects a complaint
pub const COMPLAINT_ERROR_EVENT: &str = "ComplaintError(string)";

/// Topic 0 of [`COMPLAINT_ERROR_EVENT`]
pub fn complaint_error_signature() -> H256 {
    H256::keccak(COMPLAINT_ERROR_EVENT.as_bytes())
}

/// Decoded broadcast body, still in wire hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload {
    /// `t` encoded points
    pub verification_vector: String,
    /// `n` ledger-order share records
    pub secret_key_contribution: String,
}

impl BroadcastPayload {
    /// Ledger-order record addressed to participant `index`
    pub fn record_for(&self, index: usize) -> Option<&str> {
        self.secret_key_contribution
            .get(RECORD_HEX_LEN * index..RECORD_HEX_LEN * (index + 1))
    }
}

/// Minimum hex length of a payload for the given committee
pub fn payload_hex_len(t: usize, n: usize) -> usize {
    HEADER_HEX_LEN + t * POINT_HEX_LEN + GAP_HEX_LEN + n * RECORD_HEX_LEN
}

/// Split a broadcast payload into vector and share block.
pub fn decode_broadcast_payload(
    data_hex: &str,
    t: usize,
    n: usize,
) -> Result<BroadcastPayload, WireError> {
    let expected = payload_hex_len(t, n);
    let too_short = WireError::TooShort {
        expected,
        actual: data_hex.len(),
    };
    if data_hex.len() < expected {
        return Err(too_short);
    }
    let vv_end = HEADER_HEX_LEN + t * POINT_HEX_LEN;
    let skc_start = vv_end + GAP_HEX_LEN;
    let verification_vector = data_hex
        .get(HEADER_HEX_LEN..vv_end)
        .ok_or_else(|| too_short.clone())?;
    let secret_key_contribution = data_hex
        .get(skc_start..skc_start + n * RECORD_HEX_LEN)
        .ok_or(too_short)?;
    Ok(BroadcastPayload {
        verification_vector: verification_vector.to_string(),
        secret_key_contribution: secret_key_contribution.to_string(),
    })
}

/// Encode the broadcast body the ledger contract emits for a broadcast.
pub fn encode_broadcast_payload(vector: &[G2Point], shares: &[KeyShare]) -> Vec<u8> {
    let vv_offset = 64u64;
    let skc_offset = vv_offset + 32 + 128 * vector.len() as u64;
    let mut out = Vec::with_capacity(payload_hex_len(vector.len(), shares.len()) / 2);
    out.extend_from_slice(&H256::from_u64(vv_offset).0);
    out.extend_from_slice(&H256::from_u64(skc_offset).0);
    out.extend_from_slice(&H256::from_u64(vector.len() as u64).0);
    for point in vector {
        for coord in &point.0 {
            out.extend_from_slice(&coord.0);
        }
    }
    out.extend_from_slice(&H256::from_u64(shares.len() as u64).0);
    for share in shares {
        out.extend_from_slice(&share.public_key[0].0);
        out.extend_from_slice(&share.public_key[1].0);
        out.extend_from_slice(&share.share.0);
    }
    out
}

/// Move the trailing 64-char field of a 192-char record to the front.
///
/// Turns a ledger-order record into key-service order. Not an involution:
/// applying it twice does not restore the input.
pub fn reorder_share_record(record: &str) -> String {
    match (record.get(128..192), record.get(..128)) {
        (Some(tail), Some(head)) => format!("{tail}{head}"),
        _ => record.to_string(),
    }
}

/// Key-service order record back to ledger order.
pub fn ledger_order_record(record: &str) -> String {
    match (record.get(64..192), record.get(..64)) {
        (Some(tail), Some(head)) => format!("{tail}{head}"),
        _ => record.to_string(),
    }
}

fn records(contribution: &str, n: usize) -> Result<Vec<&str>, WireError> {
    (0..n)
        .map(|i| {
            contribution
                .get(RECORD_HEX_LEN * i..RECORD_HEX_LEN * (i + 1))
                .ok_or(WireError::TooShort {
                    expected: RECORD_HEX_LEN * n,
                    actual: contribution.len(),
                })
        })
        .collect()
}

/// Reorder every record of a ledger-order contribution into key-service order.
pub fn ledger_contribution_to_native(contribution: &str, n: usize) -> Result<String, WireError> {
    Ok(records(contribution, n)?
        .into_iter()
        .map(reorder_share_record)
        .collect())
}

fn word(record: &str, index: usize) -> Result<H256, WireError> {
    let digits = record
        .get(64 * index..64 * (index + 1))
        .ok_or_else(|| WireError::InvalidHex {
            message: format!("word {index} of share record is not ASCII hex"),
        })?;
    H256::from_hex(digits)
}

/// Split a key-service order contribution into ledger `KeyShare`s.
pub fn key_shares_from_native(contribution: &str, n: usize) -> Result<Vec<KeyShare>, WireError> {
    records(contribution, n)?
        .into_iter()
        .map(|record| {
            let share = word(record, 0)?;
            let pk_a = word(record, 1)?;
            let pk_b = word(record, 2)?;
            Ok(KeyShare {
                public_key: [pk_a, pk_b],
                share,
            })
        })
        .collect()
}

/// Decode consecutive 256-char points.
pub fn g2_points_from_hex(data: &str) -> Result<Vec<G2Point>, WireError> {
    if data.len() % POINT_HEX_LEN != 0 {
        return Err(WireError::Misaligned {
            len: data.len(),
            width: POINT_HEX_LEN,
        });
    }
    (0..data.len() / POINT_HEX_LEN)
        .map(|i| {
            data.get(POINT_HEX_LEN * i..POINT_HEX_LEN * (i + 1))
                .ok_or_else(|| WireError::InvalidHex {
                    message: format!("point {i} is not ASCII hex"),
                })
                .and_then(G2Point::from_hex)
        })
        .collect()
}

/// Encode points back-to-back.
pub fn g2_points_to_hex(points: &[G2Point]) -> String {
    points.iter().map(G2Point::to_hex).collect()
}
