//! Protocol phases of a full DKG run.
//!
//! ```text
//! broadcast -> receive + verify -> complaints? -> alright -> wait for all
//!     -> complaint resolution -> (key assembly, see keygen)
//! ```
//!
//! Every loop polls the ledger on the session's timer and checks on each tick
//! that the group has not failed and its channel was not restarted.

use crate::complaint::{
    check_failed_dkg, check_no_complaints, check_response, ensure_group_alive, report_bad_data,
    send_complaint, wait_for_session_fail,
};
use crate::errors::{DkgError, DkgResult};
use crate::scanner::BroadcastScanner;
use crate::session::DkgSession;
use quorum_core::{ComplaintReason, DkgStep};

/// Per-member outcome of the broadcast phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    /// A broadcast from the member was seen
    pub received: Vec<bool>,
    /// The member's share verified
    pub correct: Vec<bool>,
}

impl BroadcastResult {
    /// Only this node's own slot is set
    pub fn new(n: usize, own_index: usize) -> Self {
        let mut received = vec![false; n];
        let mut correct = vec![false; n];
        received[own_index] = true;
        correct[own_index] = true;
        Self { received, correct }
    }

    /// Every member's broadcast was seen
    pub fn all_received(&self) -> bool {
        self.received.iter().all(|r| *r)
    }

    /// First member to complain about, in index order
    pub fn first_fault(&self) -> Option<(usize, ComplaintReason)> {
        self.received
            .iter()
            .zip(&self.correct)
            .enumerate()
            .find_map(|(i, (received, correct))| match (received, correct) {
                (false, _) => Some((i, ComplaintReason::NoBroadcast)),
                (true, false) => Some((i, ComplaintReason::BadData)),
                (true, true) => None,
            })
    }
}

async fn ensure_alive(session: &DkgSession) -> DkgResult<()> {
    ensure_group_alive(
        session.ledger().as_ref(),
        session.group_name(),
        session.group(),
        session.channel_started_time(),
    )
    .await
}

/// One scan for new broadcasts. When everyone has broadcast the scan covers
/// the whole channel rather than only new blocks.
pub async fn sync_broadcast_data(
    session: &mut DkgSession,
    scanner: &mut BroadcastScanner,
    result: &mut BroadcastResult,
) -> DkgResult<()> {
    tracing::info!(group = %session.group_name(), "syncing broadcast data");
    let full_pass = session.is_everyone_broadcasted().await?;
    let events = scanner.get_events(full_pass).await;

    for event in events {
        let Some(from) = session.index_of(event.node_id) else {
            tracing::warn!(group = %session.group_name(), node = %event.node_id, "broadcast from unknown node");
            continue;
        };
        if result.received[from] && from != session.index() {
            continue;
        }
        result.received[from] = true;
        if from != session.index() {
            tracing::info!(group = %session.group_name(), from, "receiving from node");
        }
        match session.receive_from_node(from, &event).await {
            Ok(()) => result.correct[from] = true,
            Err(err @ (DkgError::Verification { .. } | DkgError::Wire(_))) => {
                tracing::error!(group = %session.group_name(), from, error = %err, "broadcast did not verify");
            }
            Err(err) => return Err(err),
        }
    }

    let received = result.received.iter().filter(|r| **r).count();
    tracing::info!(group = %session.group_name(), received, n = session.n(), "total broadcasts received");
    Ok(())
}

/// Collect broadcasts until every member's arrived or the broadcast phase
/// timed out.
pub async fn receive_broadcast_data(session: &mut DkgSession) -> DkgResult<BroadcastResult> {
    let mut result = BroadcastResult::new(session.n(), session.index());
    let mut scanner = session.scanner();
    let start = session.channel_started_time();
    tracing::info!(group = %session.group_name(), "fetching broadcasted data");

    while !result.all_received() {
        ensure_alive(session).await?;
        let time_gone = session.ledger_time().await?.saturating_sub(start);
        let time_left = session.dkg_timeout().saturating_sub(time_gone);
        tracing::info!(group = %session.group_name(), time_left, "trying to receive broadcasted data");

        sync_broadcast_data(session, &mut scanner, &mut result).await?;
        if time_gone > session.dkg_timeout() {
            break;
        }
        session.timer().tick().await?;
    }
    Ok(result)
}

/// Complain about the first member that did not broadcast, or else the first
/// whose data did not verify.
pub async fn check_broadcast_result(
    session: &mut DkgSession,
    result: &BroadcastResult,
) -> DkgResult<()> {
    match result.first_fault() {
        Some((index, ComplaintReason::BadData)) => report_bad_data(session, index).await,
        Some((index, reason)) => send_complaint(session, index, reason).await,
        None => Ok(()),
    }
}

/// Broadcast phase: send own broadcast, collect and verify the others,
/// complain about faults.
pub async fn broadcast_and_check_data(session: &mut DkgSession) -> DkgResult<()> {
    if session.is_node_broadcasted().await? {
        tracing::info!(group = %session.group_name(), "broadcast has been already sent");
        session.advance_step(DkgStep::Broadcast);
    } else {
        tracing::info!(group = %session.group_name(), "sending broadcast");
        session.broadcast().await?;
    }
    let result = receive_broadcast_data(session).await?;
    check_broadcast_result(session, &result).await?;
    session.advance_step(DkgStep::BroadcastVerification);
    Ok(())
}

/// Poll alright notes until every member sent one, a complaint appears, or
/// the alright phase timed out.
async fn collect_alright(session: &mut DkgSession, alright_sent: &mut [bool]) -> DkgResult<()> {
    let alright_started = session
        .ledger()
        .alright_started_time(session.group())
        .await?;
    session.advance_step(DkgStep::AlrightReceiving);

    while alright_sent.iter().any(|sent| !sent) {
        ensure_alive(session).await?;
        if !check_no_complaints(session).await? {
            break;
        }
        let time_gone = session.ledger_time().await?.saturating_sub(alright_started);
        if time_gone > session.dkg_timeout() {
            tracing::info!(group = %session.group_name(), "alright phase timed out");
            break;
        }
        for (index, sent) in alright_sent.iter_mut().enumerate() {
            if !*sent {
                *sent = session.is_all_data_received(index).await?;
            }
        }
        if alright_sent.iter().any(|sent| !sent) {
            session.timer().tick().await?;
        }
    }
    Ok(())
}

/// File `NoAlright` against missing members in index order, stopping at the
/// first the ledger accepts.
async fn complain_no_alright(session: &mut DkgSession, alright_sent: &[bool]) -> DkgResult<()> {
    let channel_started_time = session
        .ledger()
        .channel_started_time(session.group())
        .await?;
    for (index, sent) in alright_sent.iter().enumerate() {
        if *sent || index == session.index() {
            continue;
        }
        match session.send_complaint(index, ComplaintReason::NoAlright).await {
            Ok(true) => {
                return wait_for_session_fail(
                    session,
                    channel_started_time,
                    ComplaintReason::NoAlright.missing(),
                )
                .await;
            }
            Ok(false) | Err(DkgError::Transaction { .. }) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Full protocol run up to, not including, key assembly.
///
/// Returns once every member sent alright. Fails with
/// [`DkgError::NotEveryoneSentAlright`] when the run ends with members
/// unaccounted for, or with [`DkgError::Failed`] when the group failed.
pub async fn run_protocol(session: &mut DkgSession) -> DkgResult<()> {
    let channel_started_time = session.channel_started_time();

    broadcast_and_check_data(session).await?;

    if !session.is_everyone_broadcasted().await? {
        wait_for_session_fail(session, channel_started_time, "broadcast").await?;
    }
    ensure_alive(session).await?;

    let mut alright_sent = vec![false; session.n()];
    if check_no_complaints(session).await? {
        tracing::info!(group = %session.group_name(), "no complaints sent in group, sending alright");
        if !session.is_all_data_received(session.index()).await? {
            session.alright().await?;
        }
        alright_sent[session.index()] = true;
    }

    ensure_alive(session).await?;
    check_response(session).await?;

    collect_alright(session, &mut alright_sent).await?;

    if check_no_complaints(session).await? && alright_sent.iter().any(|sent| !sent) {
        complain_no_alright(session, &alright_sent).await?;
    }

    check_response(session).await?;

    if !session.is_everyone_sent_alright().await? && check_no_complaints(session).await? {
        wait_for_session_fail(session, channel_started_time, "alright").await?;
    }

    if !check_no_complaints(session).await? {
        check_response(session).await?;
        let data = session.complaint_data().await?;
        wait_for_session_fail(
            session,
            channel_started_time,
            ComplaintReason::BadData.missing(),
        )
        .await?;

        check_failed_dkg(session.ledger().as_ref(), session.group_name(), session.group()).await?;
        if let Some(accused) = session.index_of(data.accused) {
            if accused != session.index() {
                tracing::info!(
                    group = %session.group_name(),
                    target = accused,
                    "accused node has not sent response, sending complaint"
                );
                send_complaint(session, accused, ComplaintReason::NoResponse).await?;
            }
        }
    }

    if alright_sent.iter().any(|sent| !sent) {
        tracing::info!(group = %session.group_name(), "not everyone sent alright");
        return Err(DkgError::NotEveryoneSentAlright {
            group: session.group_name().to_string(),
        });
    }
    tracing::info!(group = %session.group_name(), "everyone sent alright");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_faulty_index_decides_reason() {
        let mut result = BroadcastResult::new(4, 0);
        result.received = vec![true, true, false, true];
        result.correct = vec![true, false, false, true];
        assert_eq!(result.first_fault(), Some((1, ComplaintReason::BadData)));

        result.received[1] = false;
        assert_eq!(result.first_fault(), Some((1, ComplaintReason::NoBroadcast)));
    }

    #[test]
    fn test_clean_result_has_no_fault() {
        let result = BroadcastResult {
            received: vec![true; 4],
            correct: vec![true; 4],
        };
        assert!(result.all_received());
        assert_eq!(result.first_fault(), None);
    }

    proptest::proptest! {
        #[test]
        fn test_first_fault_is_lowest_faulty_index(
            slots in proptest::collection::vec((proptest::bool::ANY, proptest::bool::ANY), 1..16)
        ) {
            let result = BroadcastResult {
                received: slots.iter().map(|(received, _)| *received).collect(),
                correct: slots.iter().map(|(received, correct)| *received && *correct).collect(),
            };
            let expected = slots.iter().position(|(received, correct)| !(*received && *correct));
            proptest::prop_assert_eq!(result.first_fault().map(|(index, _)| index), expected);
            if let Some((index, reason)) = result.first_fault() {
                let reason_expected = if slots[index].0 {
                    ComplaintReason::BadData
                } else {
                    ComplaintReason::NoBroadcast
                };
                proptest::prop_assert_eq!(reason, reason_expected);
            }
        }
    }

    #[test]
    fn test_new_result_seeds_own_slot() {
        let result = BroadcastResult::new(3, 1);
        assert_eq!(result.received, vec![false, true, false]);
        assert_eq!(result.correct, vec![false, true, false]);
    }
}
