//! Session runner: one DKG attempt from roster lookup to stored key bundle.

use crate::complaint::wait_for_fail;
use crate::config::DkgRuntimeConfig;
use crate::errors::{DkgError, DkgResult};
use crate::key_client::KeyServiceClient;
use crate::keygen::generate_bls_keys;
use crate::orchestrator::run_protocol;
use crate::session::{DkgSession, SessionRequest};
use crate::storage::KeyBundleStore;
use crate::timer::PollTimer;
use quorum_core::{
    DkgStatus, DkgStep, GroupId, GroupRoster, KeyBundle, LedgerChannel, SecureKeyService,
};
use std::sync::Arc;

/// Collaborators shared by every session of a node.
#[derive(Clone)]
pub struct DkgContext {
    /// Ledger channel
    pub ledger: Arc<dyn LedgerChannel>,
    /// Group membership
    pub roster: Arc<dyn GroupRoster>,
    /// Retrying key service client
    pub keys: KeyServiceClient,
    /// Key bundle persistence
    pub store: Arc<dyn KeyBundleStore>,
    /// Runtime settings
    pub config: DkgRuntimeConfig,
}

impl DkgContext {
    /// Bundle the collaborators; the key service is wrapped in the configured retry policy
    pub fn new(
        ledger: Arc<dyn LedgerChannel>,
        roster: Arc<dyn GroupRoster>,
        key_service: Arc<dyn SecureKeyService>,
        store: Arc<dyn KeyBundleStore>,
        config: DkgRuntimeConfig,
    ) -> Self {
        let keys = KeyServiceClient::new(key_service, config.key_service_retry());
        Self {
            ledger,
            roster,
            keys,
            store,
            config,
        }
    }
}

/// Outcome of one DKG attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkgRunResult {
    /// Terminal status: `Done`, `Failed` or `KeyGenerationError`
    pub status: DkgStatus,
    /// Last completed step
    pub step: DkgStep,
    /// Key bundle when `status` is `Done`
    pub keys: Option<KeyBundle>,
}

impl DkgRunResult {
    /// Failure before any protocol step
    pub fn failed() -> Self {
        Self {
            status: DkgStatus::Failed,
            step: DkgStep::None,
            keys: None,
        }
    }
}

/// Build the session for `request`.
///
/// When the roster does not let the session initialize, the node waits out
/// one failure window for the group (it may be the reason the group fails)
/// before returning the error.
pub async fn get_session(
    context: &DkgContext,
    request: &SessionRequest,
    timer: PollTimer,
) -> DkgResult<DkgSession> {
    let result = DkgSession::init(
        request,
        &context.config.eth_key_name,
        context.roster.as_ref(),
        Arc::clone(&context.ledger),
        context.keys.clone(),
        timer.clone(),
    )
    .await;

    match result {
        Err(err @ DkgError::Initialization { .. }) => {
            tracing::error!(group = %request.group_name, error = %err, "DKG session initialization failed");
            let group = GroupId::from_name(&request.group_name);
            let channel_started_time = context.ledger.channel_started_time(&group).await?;
            wait_for_fail(
                context.ledger.as_ref(),
                &timer,
                &request.group_name,
                &group,
                channel_started_time,
                "broadcast",
            )
            .await?;
            Err(err)
        }
        other => other,
    }
}

/// Whether the rest of the group already completed this DKG
async fn is_last_dkg_finished(session: &DkgSession) -> DkgResult<bool> {
    session.is_everyone_sent_alright().await
}

async fn run_phases(session: &mut DkgSession) -> DkgResult<DkgStatus> {
    if is_last_dkg_finished(session).await? {
        tracing::info!(group = %session.group_name(), "DKG is completed, fetching data");
        session.fetch_all_broadcasted_data().await?;
        Ok(DkgStatus::InProgress)
    } else if session.is_channel_opened().await? {
        tracing::info!(group = %session.group_name(), "starting DKG procedure");
        run_protocol(session).await?;
        Ok(DkgStatus::InProgress)
    } else {
        tracing::info!(group = %session.group_name(), "channel is closed");
        Ok(DkgStatus::Failed)
    }
}

/// Run the DKG for an initialized session and assemble its key bundle.
///
/// Never fails: every error is folded into the returned status. On `Done`
/// the bundle is persisted; a persistence failure is reported as
/// `KeyGenerationError` because the node can retry it alone.
pub async fn run_session(session: &mut DkgSession, store: &dyn KeyBundleStore) -> DkgRunResult {
    let status = match run_phases(session).await {
        Ok(status) => status,
        Err(err) => {
            tracing::info!(group = %session.group_name(), error = %err, "DKG procedure failed");
            DkgStatus::Failed
        }
    };

    let (status, keys) = if status == DkgStatus::Failed {
        (DkgStatus::Failed, None)
    } else {
        match generate_bls_keys(session).await {
            Ok(bundle) => match store
                .save(session.group_name(), session.rotation_id(), &bundle)
                .await
            {
                Ok(()) => (DkgStatus::Done, Some(bundle)),
                Err(err) => {
                    tracing::error!(group = %session.group_name(), error = %err, "failed to save key bundle");
                    session.advance_step(DkgStep::KeyGenerationError);
                    (DkgStatus::KeyGenerationError, None)
                }
            },
            Err(err) => {
                tracing::info!(group = %session.group_name(), error = %err, "DKG failed during key generation");
                session.advance_step(DkgStep::KeyGenerationError);
                (DkgStatus::KeyGenerationError, None)
            }
        }
    };

    tracing::info!(
        group = %session.group_name(),
        status = ?status,
        step = %session.last_completed_step(),
        "DKG finished"
    );
    DkgRunResult {
        status,
        step: session.last_completed_step(),
        keys,
    }
}

/// Initialize and run one session.
pub async fn run_dkg(context: &DkgContext, request: &SessionRequest, timer: PollTimer) -> DkgRunResult {
    match get_session(context, request, timer).await {
        Ok(mut session) => run_session(&mut session, context.store.as_ref()).await,
        Err(err) => {
            tracing::info!(group = %request.group_name, error = %err, "DKG session was not started");
            DkgRunResult::failed()
        }
    }
}
