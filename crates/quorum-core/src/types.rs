//! Identifiers and ledger value types.

use crate::errors::WireError;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// 32-byte word as used for hashes, topics and 256-bit integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// All-zero word
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Keccak-256 of the given bytes
    pub fn keccak(data: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Word holding a big-endian unsigned integer
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Low 64 bits, or `None` if the value does not fit
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[24..]);
        Some(u64::from_be_bytes(low))
    }

    /// Parse hex of at most 64 digits (optional `0x`), left-padding with zeros
    pub fn from_hex(input: &str) -> Result<Self, WireError> {
        let digits = input.strip_prefix("0x").unwrap_or(input);
        if digits.len() > 64 {
            return Err(WireError::InvalidHex {
                message: format!("{} hex digits do not fit in 32 bytes", digits.len()),
            });
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes).map_err(|e| WireError::InvalidHex {
            message: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// 64 lowercase hex digits, no prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decimal rendering of the word as an unsigned 256-bit integer
    pub fn to_decimal(&self) -> String {
        let mut digits = Vec::new();
        let mut value = self.0.to_vec();
        while value.iter().any(|b| *b != 0) {
            let mut remainder = 0u32;
            for byte in value.iter_mut() {
                let acc = (remainder << 8) | u32::from(*byte);
                *byte = (acc / 10) as u8;
                remainder = acc % 10;
            }
            digits.push(char::from(b'0' + remainder as u8));
        }
        if digits.is_empty() {
            return "0".to_string();
        }
        digits.iter().rev().collect()
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Transaction hash
pub type TxHash = H256;

/// 20-byte ledger account / contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Group identifier: Keccak-256 of the group name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub H256);

impl GroupId {
    /// Derive the identifier the ledger uses for a named group
    pub fn from_name(name: &str) -> Self {
        Self(H256::keccak(name.as_bytes()))
    }

    /// Topic word carried by ledger logs for this group
    pub fn as_topic(&self) -> H256 {
        self.0
    }

    /// Decimal rendering used in key-service names
    pub fn to_decimal(&self) -> String {
        self.0.to_decimal()
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-level node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point on G2 as four big-endian 256-bit coordinates
/// `(x.a, x.b, y.a, y.b)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct G2Point(pub [H256; 4]);

impl G2Point {
    /// Hex width of one encoded point
    pub const HEX_LEN: usize = 256;

    /// Decode four consecutive 64-hex words
    pub fn from_hex(input: &str) -> Result<Self, WireError> {
        if input.len() != Self::HEX_LEN {
            return Err(WireError::TooShort {
                expected: Self::HEX_LEN,
                actual: input.len(),
            });
        }
        let mut coords = [H256::ZERO; 4];
        for (i, coord) in coords.iter_mut().enumerate() {
            let word = input
                .get(64 * i..64 * (i + 1))
                .ok_or(WireError::TooShort {
                    expected: Self::HEX_LEN,
                    actual: input.len(),
                })?;
            *coord = H256::from_hex(word)?;
        }
        Ok(Self(coords))
    }

    /// Encode as four 64-hex words
    pub fn to_hex(&self) -> String {
        self.0.iter().map(H256::to_hex).collect()
    }

    /// Coordinates as decimal strings
    pub fn to_decimal_coords(&self) -> Vec<String> {
        self.0.iter().map(H256::to_decimal).collect()
    }
}

impl fmt::Debug for G2Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G2Point({}..)", &self.0[0].to_hex()[..8])
    }
}

/// Per-recipient share record as the ledger contract expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// Ephemeral public key used for the share encryption
    pub public_key: [H256; 2],
    /// Encrypted share
    pub share: H256,
}

/// Full-transaction view of a block, as far as the scanner needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height
    pub number: u64,
    /// Block timestamp in seconds
    pub timestamp: u64,
    /// Transactions included in the block
    pub transactions: Vec<Transaction>,
}

/// Transaction summary inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash
    pub hash: TxHash,
    /// Recipient; `None` for contract creation
    pub to: Option<Address>,
}

/// One emitted log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; topic 0 is the event signature
    pub topics: Vec<H256>,
    /// Non-indexed payload
    pub data: Vec<u8>,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: TxHash,
    /// Block in which it was mined
    pub block_number: u64,
    /// Execution succeeded
    pub status: bool,
    /// Logs emitted during execution
    pub logs: Vec<LogEntry>,
}

/// Outstanding complaint as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintData {
    /// Node that filed the complaint
    pub accuser: NodeId,
    /// Node the complaint is against
    pub accused: NodeId,
}

impl ComplaintData {
    /// Sentinel id reported when no complaint is outstanding
    pub const SENTINEL: NodeId = NodeId(u64::MAX);

    /// Sentinel pair
    pub const NONE: ComplaintData = ComplaintData {
        accuser: Self::SENTINEL,
        accused: Self::SENTINEL,
    };

    /// No complaint outstanding
    pub fn is_none(&self) -> bool {
        self.accuser == Self::SENTINEL && self.accused == Self::SENTINEL
    }

    /// Outstanding complaint against `node`
    pub fn targets(&self, node: NodeId) -> bool {
        self.accuser != self.accused && self.accused == node
    }
}

/// Roster entry for one group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterNode {
    /// Ledger-level identifier
    pub id: NodeId,
    /// Hex-encoded public key used for share encryption
    pub public_key: String,
}
