//! Secure key service: all curve and polynomial arithmetic lives behind it.

use crate::errors::KeyServiceResult;
use crate::types::G2Point;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a polynomial generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolyStatus {
    /// New polynomial created
    Created,
    /// Polynomial with this name already existed
    Preexisting,
    /// Generation failed
    Fail,
}

/// Material for answering a bad-data complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintResponse {
    /// Share for the accuser, as a G2 point
    pub share: G2Point,
    /// Diffie-Hellman key, hex
    pub dh_key: String,
    /// Verification vector multiplied by the accuser's index
    pub verification_vector_mult: Vec<G2Point>,
}

/// Operations delegated to the key-management service.
///
/// Share strings are in key-service order: per recipient, `share(64)` then
/// `publicKey(128)` hex characters. Verification vectors travel as wire hex.
#[async_trait]
pub trait SecureKeyService: Send + Sync {
    /// Generate the secret polynomial named `poly_name`
    async fn generate_dkg_poly(&self, poly_name: &str) -> KeyServiceResult<PolyStatus>;

    /// Public commitment to the polynomial
    async fn verification_vector(&self, poly_name: &str) -> KeyServiceResult<Vec<G2Point>>;

    /// Encrypted shares for every recipient, concatenated in index order
    async fn secret_key_contribution(
        &self,
        poly_name: &str,
        public_keys: &[String],
    ) -> KeyServiceResult<String>;

    /// Check a received share against its sender's verification vector
    async fn verify_secret_share(
        &self,
        verification_vector: &str,
        eth_key_name: &str,
        share: &str,
        index: usize,
    ) -> KeyServiceResult<bool>;

    /// Derive the answer to a complaint filed by participant `accuser_index`
    async fn complaint_response(
        &self,
        poly_name: &str,
        accuser_index: usize,
    ) -> KeyServiceResult<ComplaintResponse>;

    /// Combine received shares into this node's BLS private key
    async fn create_bls_private_key(
        &self,
        poly_name: &str,
        bls_name: &str,
        eth_key_name: &str,
        secret_shares: &str,
    ) -> KeyServiceResult<String>;

    /// Public key of a stored BLS key; `NotFound` if absent
    async fn bls_public_key(&self, bls_name: &str) -> KeyServiceResult<Vec<String>>;

    /// Per-participant BLS public keys from all verification vectors
    async fn calculate_all_bls_public_keys(
        &self,
        verification_vectors: &[String],
    ) -> KeyServiceResult<Vec<Vec<String>>>;
}
