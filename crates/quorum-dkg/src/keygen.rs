//! Key assembly after a successful protocol run.

use crate::errors::{DkgError, DkgResult};
use crate::session::DkgSession;
use quorum_core::{DkgStep, KeyBundle};

/// Create (or fetch) this node's BLS key and assemble the key bundle.
///
/// Idempotent: when the key service already holds the key under this
/// session's name, only its public key is fetched. Any failure is reported as
/// [`DkgError::KeyGeneration`]; it concerns this node only.
pub async fn generate_bls_keys(session: &mut DkgSession) -> DkgResult<KeyBundle> {
    let bundle = assemble(session).await.map_err(DkgError::key_generation)?;
    session.advance_step(DkgStep::KeyGeneration);
    Ok(bundle)
}

async fn assemble(session: &mut DkgSession) -> DkgResult<KeyBundle> {
    if session.is_bls_key_generated().await? {
        tracing::info!(group = %session.group_name(), "BLS key exists, fetching");
        session.fetch_bls_public_key().await?;
    } else {
        let encrypted = session.generate_bls_key().await?;
        tracing::info!(group = %session.group_name(), encrypted_key = %encrypted, "node's encrypted BLS key");
    }

    let bls_public_keys = session.bls_public_keys().await?;
    let common_public_key = session
        .ledger()
        .common_public_key(session.group())
        .await?
        .to_decimal_coords();
    let public_key = session
        .public_key()
        .map(<[String]>::to_vec)
        .ok_or_else(|| DkgError::missing_data(session.group_name(), "BLS public key"))?;

    Ok(KeyBundle {
        common_public_key,
        public_key,
        bls_public_keys,
        t: session.t(),
        n: session.n(),
        key_share_name: session.bls_name().to_string(),
    })
}
