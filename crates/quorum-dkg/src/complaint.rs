//! Complaint and response sub-protocol, and group failure detection.
//!
//! A complaint that the ledger accepts opens a wait window of one DKG timeout
//! during which the node watches for the group to fail. A group has failed
//! when its channel closed without success, or when the channel was restarted
//! (its start time changed). Either one ends the run with
//! [`DkgError::Failed`].

use crate::errors::{DkgError, DkgResult};
use crate::session::DkgSession;
use crate::timer::PollTimer;
use quorum_core::{ComplaintReason, GroupId, LedgerChannel};

/// Fail if the ledger reports the group's DKG as failed.
///
/// A closed channel whose last DKG did not succeed counts as failed, whether
/// or not the group ever completed a DKG before.
pub async fn check_failed_dkg(
    ledger: &dyn LedgerChannel,
    group_name: &str,
    group: &GroupId,
) -> DkgResult<()> {
    if ledger.is_channel_opened(group).await? || ledger.is_last_dkg_successful(group).await? {
        return Ok(());
    }
    tracing::warn!(group = %group_name, "channel closed without success");
    Err(DkgError::failed(group_name, "DKG failed"))
}

/// Fail if the group failed or its channel was restarted since
/// `channel_started_time`.
pub async fn ensure_group_alive(
    ledger: &dyn LedgerChannel,
    group_name: &str,
    group: &GroupId,
    channel_started_time: u64,
) -> DkgResult<()> {
    check_failed_dkg(ledger, group_name, group).await?;
    let current = ledger.channel_started_time(group).await?;
    if current != channel_started_time {
        tracing::warn!(
            group = %group_name,
            started = channel_started_time,
            current,
            "channel was restarted"
        );
        return Err(DkgError::failed(group_name, "DKG failed due to event FailedDKG"));
    }
    Ok(())
}

/// Watch the group for one DKG timeout of ledger time.
///
/// Returns normally when the window expires; fails as soon as the group is
/// seen failed or restarted. `missing` names what some member did not
/// deliver and only feeds the logs.
pub async fn wait_for_fail(
    ledger: &dyn LedgerChannel,
    timer: &PollTimer,
    group_name: &str,
    group: &GroupId,
    channel_started_time: u64,
    missing: &str,
) -> DkgResult<()> {
    tracing::info!(group = %group_name, "will wait for FailedDKG event");
    let start = ledger.latest_block().await?.timestamp;
    let dkg_timeout = ledger.dkg_timeout().await?;
    while ledger.latest_block().await?.timestamp.saturating_sub(start) < dkg_timeout {
        if missing.is_empty() {
            tracing::info!(group = %group_name, "waiting for FailedDKG event");
        } else {
            tracing::info!(group = %group_name, missing, "not all nodes sent data, waiting for FailedDKG event");
        }
        ensure_group_alive(ledger, group_name, group, channel_started_time).await?;
        timer.tick().await?;
    }
    Ok(())
}

/// [`wait_for_fail`] bound to a session.
pub async fn wait_for_session_fail(
    session: &DkgSession,
    channel_started_time: u64,
    missing: &str,
) -> DkgResult<()> {
    wait_for_fail(
        session.ledger().as_ref(),
        session.timer(),
        session.group_name(),
        session.group(),
        channel_started_time,
        missing,
    )
    .await
}

/// Whether the ledger has no complaint outstanding for the group
pub async fn check_no_complaints(session: &DkgSession) -> DkgResult<bool> {
    Ok(session.complaint_data().await?.is_none())
}

/// File a complaint; if accepted, wait for the group to fail.
///
/// A failed complaint transaction is dropped: the caller tries again on a
/// later poll.
pub async fn send_complaint(
    session: &mut DkgSession,
    index: usize,
    reason: ComplaintReason,
) -> DkgResult<()> {
    let channel_started_time = session
        .ledger()
        .channel_started_time(session.group())
        .await?;
    match session.send_complaint(index, reason).await {
        Ok(true) => wait_for_session_fail(session, channel_started_time, reason.missing()).await,
        Ok(false) | Err(DkgError::Transaction { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Accuse `index` of bad data. If accepted, wait for the response window and
/// then complain that no response came.
pub async fn report_bad_data(session: &mut DkgSession, index: usize) -> DkgResult<()> {
    let channel_started_time = session
        .ledger()
        .channel_started_time(session.group())
        .await?;
    let accepted = match session.send_complaint(index, ComplaintReason::BadData).await {
        Ok(accepted) => accepted,
        Err(DkgError::Transaction { .. }) => return Ok(()),
        Err(err) => return Err(err),
    };
    if !accepted {
        return Ok(());
    }

    wait_for_session_fail(
        session,
        channel_started_time,
        ComplaintReason::BadData.missing(),
    )
    .await?;
    tracing::info!(
        group = %session.group_name(),
        target = index,
        "accused node did not send a response, sending complaint once again"
    );
    match session.send_complaint(index, ComplaintReason::NoResponse).await {
        Ok(_) | Err(DkgError::Transaction { .. }) => {}
        Err(err) => return Err(err),
    }
    wait_for_session_fail(
        session,
        channel_started_time,
        ComplaintReason::NoResponse.missing(),
    )
    .await
}

/// Answer a complaint. Transaction and key service failures are logged and
/// dropped.
async fn respond(session: &mut DkgSession, accuser: quorum_core::NodeId) -> DkgResult<()> {
    match session.respond(accuser).await {
        Ok(_) => Ok(()),
        Err(err @ (DkgError::Transaction { .. } | DkgError::KeyService(_))) => {
            tracing::error!(group = %session.group_name(), error = %err, "response failed");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// If a complaint against this node is outstanding, answer it and wait for
/// the outcome.
pub async fn check_response(session: &mut DkgSession) -> DkgResult<()> {
    let data = session.complaint_data().await?;
    if !data.targets(session.node_id()) {
        return Ok(());
    }
    tracing::info!(group = %session.group_name(), accuser = %data.accuser, "complaint received, sending response");
    let channel_started_time = session
        .ledger()
        .channel_started_time(session.group())
        .await?;
    respond(session, data.accuser).await?;
    tracing::info!(group = %session.group_name(), "response sent, waiting for FailedDKG event");
    wait_for_session_fail(session, channel_started_time, "").await
}
