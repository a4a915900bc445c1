//! Deterministic stand-in for the secure key service.
//!
//! No curve arithmetic: every value is a SHA-256 digest of its inputs, so
//! independent instances (one per simulated node) agree on what a correct
//! share looks like. The share a polynomial gives participant `i` is
//! `H(verification_vector_hex || i)`, and verification recomputes it.

use async_trait::async_trait;
use parking_lot::Mutex;
use quorum_core::wire::{g2_points_to_hex, RECORD_HEX_LEN};
use quorum_core::{
    threshold_for, ComplaintResponse, G2Point, KeyServiceError, KeyServiceResult, PolyStatus,
    SecureKeyService, H256,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

fn digest(parts: &[&[u8]]) -> H256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    H256(hasher.finalize().into())
}

fn point(seed: &[u8]) -> G2Point {
    G2Point([0u8, 1, 2, 3].map(|coord| digest(&[seed, &[coord]])))
}

/// Share a polynomial with this verification vector assigns to `index`
pub fn expected_share(verification_vector: &str, index: usize) -> H256 {
    digest(&[verification_vector.as_bytes(), &(index as u64).to_be_bytes()])
}

#[derive(Debug, Default)]
struct KeyState {
    polys: HashMap<String, Vec<G2Point>>,
    bls_keys: HashMap<String, Vec<String>>,
    corrupt: bool,
    create_calls: usize,
    last_created_shares: Option<String>,
    failures_left: usize,
    rejections_left: usize,
}

/// Key service of one simulated node.
#[derive(Debug)]
pub struct MockKeyService {
    t: usize,
    state: Mutex<KeyState>,
}

impl MockKeyService {
    /// Service for a committee of `n`
    pub fn new(n: usize) -> Self {
        Self {
            t: threshold_for(n),
            state: Mutex::new(KeyState::default()),
        }
    }

    /// Hand out shares that fail verification from now on
    pub fn corrupt_contributions(&self) {
        self.state.lock().corrupt = true;
    }

    /// Number of BLS private keys created
    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    /// Shares passed to the last BLS key creation
    pub fn last_created_shares(&self) -> Option<String> {
        self.state.lock().last_created_shares.clone()
    }

    /// Drop every stored BLS key
    pub fn forget_bls_keys(&self) {
        self.state.lock().bls_keys.clear();
    }

    /// Report the service unreachable for the next `count` calls
    pub fn fail_next_calls(&self, count: usize) {
        self.state.lock().failures_left = count;
    }

    /// Answer the next `count` share verifications with a server error
    pub fn reject_next_verifications(&self, count: usize) {
        self.state.lock().rejections_left = count;
    }

    fn check_reachable(state: &mut KeyState) -> KeyServiceResult<()> {
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(KeyServiceError::unreachable("connection refused"));
        }
        Ok(())
    }

    fn vector(state: &KeyState, poly_name: &str) -> KeyServiceResult<Vec<G2Point>> {
        state
            .polys
            .get(poly_name)
            .cloned()
            .ok_or_else(|| KeyServiceError::not_found(poly_name))
    }
}

#[async_trait]
impl SecureKeyService for MockKeyService {
    async fn generate_dkg_poly(&self, poly_name: &str) -> KeyServiceResult<PolyStatus> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        if state.polys.contains_key(poly_name) {
            return Ok(PolyStatus::Preexisting);
        }
        let vector = (0..self.t)
            .map(|j| point(&[poly_name.as_bytes(), &(j as u64).to_be_bytes()].concat()))
            .collect();
        state.polys.insert(poly_name.to_string(), vector);
        Ok(PolyStatus::Created)
    }

    async fn verification_vector(&self, poly_name: &str) -> KeyServiceResult<Vec<G2Point>> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        Self::vector(&state, poly_name)
    }

    async fn secret_key_contribution(
        &self,
        poly_name: &str,
        public_keys: &[String],
    ) -> KeyServiceResult<String> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        let vector = g2_points_to_hex(&Self::vector(&state, poly_name)?);
        let corrupt = state.corrupt;
        public_keys
            .iter()
            .enumerate()
            .map(|(i, public_key)| {
                if public_key.len() != 128 {
                    return Err(KeyServiceError::server(format!(
                        "public key {i} is not 64 bytes"
                    )));
                }
                let mut share = expected_share(&vector, i);
                if corrupt {
                    share.0[0] ^= 0xff;
                }
                Ok(format!("{}{public_key}", share.to_hex()))
            })
            .collect()
    }

    async fn verify_secret_share(
        &self,
        verification_vector: &str,
        _eth_key_name: &str,
        share: &str,
        index: usize,
    ) -> KeyServiceResult<bool> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(KeyServiceError::server("malformed share"));
        }
        let Some(received) = share.get(..64) else {
            return Err(KeyServiceError::server("share record is too short"));
        };
        Ok(received == expected_share(verification_vector, index).to_hex())
    }

    async fn complaint_response(
        &self,
        poly_name: &str,
        accuser_index: usize,
    ) -> KeyServiceResult<ComplaintResponse> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        let vector = Self::vector(&state, poly_name)?;
        let index = (accuser_index as u64).to_be_bytes();
        Ok(ComplaintResponse {
            share: point(&[poly_name.as_bytes(), b"share", &index].concat()),
            dh_key: digest(&[poly_name.as_bytes(), b"dh", &index]).to_hex(),
            verification_vector_mult: vector
                .iter()
                .map(|p| point(&[p.to_hex().as_bytes(), &index].concat()))
                .collect(),
        })
    }

    async fn create_bls_private_key(
        &self,
        poly_name: &str,
        bls_name: &str,
        _eth_key_name: &str,
        secret_shares: &str,
    ) -> KeyServiceResult<String> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        Self::vector(&state, poly_name)?;
        if secret_shares.is_empty() || secret_shares.len() % RECORD_HEX_LEN != 0 {
            return Err(KeyServiceError::server(format!(
                "malformed secret shares of length {}",
                secret_shares.len()
            )));
        }
        let public_key = point(secret_shares.as_bytes()).to_decimal_coords();
        state.bls_keys.insert(bls_name.to_string(), public_key);
        state.create_calls += 1;
        state.last_created_shares = Some(secret_shares.to_string());
        Ok(digest(&[bls_name.as_bytes(), secret_shares.as_bytes()]).to_hex())
    }

    async fn bls_public_key(&self, bls_name: &str) -> KeyServiceResult<Vec<String>> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        state
            .bls_keys
            .get(bls_name)
            .cloned()
            .ok_or_else(|| KeyServiceError::not_found(bls_name))
    }

    async fn calculate_all_bls_public_keys(
        &self,
        verification_vectors: &[String],
    ) -> KeyServiceResult<Vec<Vec<String>>> {
        let mut state = self.state.lock();
        Self::check_reachable(&mut state)?;
        let combined = verification_vectors.concat();
        Ok((0..verification_vectors.len())
            .map(|i| point(&[combined.as_bytes(), &(i as u64).to_be_bytes()].concat()).to_decimal_coords())
            .collect())
    }
}
