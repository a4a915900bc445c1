//! Secure key service client boundary.
//!
//! Wraps a [`SecureKeyService`] with a [`RetryPolicy`]: unreachable-service
//! failures are retried and never reach the protocol logic. Any other failure
//! is returned as [`DkgError::KeyService`]. Once bound to a session's
//! [`PollTimer`], the pause between retries ends early with
//! [`DkgError::Cancelled`] on host shutdown.

use crate::errors::{DkgError, DkgResult};
use crate::timer::PollTimer;
use quorum_core::{
    ComplaintResponse, G2Point, KeyServiceError, PolyStatus, RetryPolicy, SecureKeyService,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

fn is_transient(err: &DkgError) -> bool {
    matches!(err, DkgError::KeyService(inner) if inner.is_transient())
}

/// Retrying handle to the key service.
#[derive(Clone)]
pub struct KeyServiceClient {
    inner: Arc<dyn SecureKeyService>,
    retry: RetryPolicy,
    timer: Option<PollTimer>,
}

impl KeyServiceClient {
    /// Client whose retries can only end by success
    pub fn new(inner: Arc<dyn SecureKeyService>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            timer: None,
        }
    }

    /// Same client, pausing between retries on `timer`
    pub fn with_timer(mut self, timer: PollTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    async fn wait(&self, delay: Duration) -> DkgResult<()> {
        match &self.timer {
            Some(timer) => timer.sleep(delay).await,
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn call<T, F, Fut>(&self, mut operation: F) -> DkgResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, KeyServiceError>>,
    {
        self.retry
            .execute_if(
                || {
                    let fut = operation();
                    async move { fut.await.map_err(DkgError::from) }
                },
                is_transient,
                |delay| self.wait(delay),
            )
            .await
    }

    /// Create the node's secret polynomial
    pub async fn generate_dkg_poly(&self, poly_name: &str) -> DkgResult<PolyStatus> {
        self.call(|| self.inner.generate_dkg_poly(poly_name)).await
    }

    /// Public commitment of the polynomial
    pub async fn verification_vector(&self, poly_name: &str) -> DkgResult<Vec<G2Point>> {
        self.call(|| self.inner.verification_vector(poly_name)).await
    }

    /// Per-member encrypted shares as one concatenated hex string
    pub async fn secret_key_contribution(
        &self,
        poly_name: &str,
        public_keys: &[String],
    ) -> DkgResult<String> {
        self.call(|| self.inner.secret_key_contribution(poly_name, public_keys))
            .await
    }

    /// Check a received share against its sender's verification vector
    pub async fn verify_secret_share(
        &self,
        verification_vector: &str,
        eth_key_name: &str,
        share: &str,
        index: usize,
    ) -> DkgResult<bool> {
        self.call(|| {
            self.inner
                .verify_secret_share(verification_vector, eth_key_name, share, index)
        })
        .await
    }

    /// Data answering a `BadData` complaint
    pub async fn complaint_response(
        &self,
        poly_name: &str,
        accuser_index: usize,
    ) -> DkgResult<ComplaintResponse> {
        self.call(|| self.inner.complaint_response(poly_name, accuser_index))
            .await
    }

    /// Assemble and store the node's BLS private key share
    pub async fn create_bls_private_key(
        &self,
        poly_name: &str,
        bls_name: &str,
        eth_key_name: &str,
        secret_shares: &str,
    ) -> DkgResult<String> {
        self.call(|| {
            self.inner
                .create_bls_private_key(poly_name, bls_name, eth_key_name, secret_shares)
        })
        .await
    }

    /// Public key of a stored BLS key
    pub async fn bls_public_key(&self, bls_name: &str) -> DkgResult<Vec<String>> {
        self.call(|| self.inner.bls_public_key(bls_name)).await
    }

    /// Whether a BLS key with this name exists
    pub async fn has_bls_key(&self, bls_name: &str) -> DkgResult<bool> {
        match self.bls_public_key(bls_name).await {
            Ok(_) => Ok(true),
            Err(DkgError::KeyService(KeyServiceError::NotFound { .. })) => {
                tracing::info!(bls_name, "no BLS key with this name");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Public key shares of every member
    pub async fn calculate_all_bls_public_keys(
        &self,
        verification_vectors: &[String],
    ) -> DkgResult<Vec<Vec<String>>> {
        self.call(|| self.inner.calculate_all_bls_public_keys(verification_vectors))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ShutdownSignal;
    use quorum_testkit::MockKeyService;

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_service_is_retried() {
        let service = Arc::new(MockKeyService::new(4));
        service.fail_next_calls(3);
        let client = KeyServiceClient::new(
            service.clone(),
            RetryPolicy::unbounded_fixed(Duration::from_secs(5)),
        );
        let start = tokio::time::Instant::now();
        assert_eq!(
            client.generate_dkg_poly("POLY:NODE_ID:1").await.unwrap(),
            PolyStatus::Created
        );
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_bls_key_is_not_an_error() {
        let client = KeyServiceClient::new(
            Arc::new(MockKeyService::new(4)),
            RetryPolicy::unbounded_fixed(Duration::from_secs(5)),
        );
        assert!(!client.has_bls_key("BLS_KEY:NONE").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_retry() {
        let service = Arc::new(MockKeyService::new(4));
        service.fail_next_calls(usize::MAX);
        let signal = ShutdownSignal::new();
        let client = KeyServiceClient::new(
            service,
            RetryPolicy::unbounded_fixed(Duration::from_secs(5)),
        )
        .with_timer(signal.timer(Duration::from_secs(30)));

        let handle = tokio::spawn(async move { client.generate_dkg_poly("POLY:NODE_ID:1").await });
        tokio::time::sleep(Duration::from_secs(60)).await;
        signal.trigger();
        assert_eq!(handle.await.unwrap(), Err(DkgError::Cancelled));
    }
}
