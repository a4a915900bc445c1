//! Multi-session host.
//!
//! Runs one tokio task per group session. Sessions share the collaborator
//! handles in [`DkgContext`] and nothing else. Shutdown cancels every
//! session at its next poll wait.

use crate::runner::{run_dkg, DkgContext, DkgRunResult};
use crate::session::SessionRequest;
use crate::timer::ShutdownSignal;
use futures::future::join_all;
use tokio::task::JoinHandle;

/// Handle to a running session.
struct SessionTask {
    request: SessionRequest,
    handle: JoinHandle<DkgRunResult>,
}

/// Runs DKG sessions for many groups concurrently.
pub struct DkgHost {
    context: DkgContext,
    shutdown: ShutdownSignal,
    tasks: Vec<SessionTask>,
}

impl DkgHost {
    /// Host with no sessions, sharing `context` across them
    pub fn new(context: DkgContext) -> Self {
        Self {
            context,
            shutdown: ShutdownSignal::new(),
            tasks: Vec::new(),
        }
    }

    /// Start a session on the current runtime
    pub fn spawn(&mut self, request: SessionRequest) {
        let context = self.context.clone();
        let timer = self.shutdown.timer(context.config.poll_interval());
        let task_request = request.clone();
        tracing::info!(group = %request.group_name, node = %request.node_id, "spawning DKG session");
        let handle = tokio::spawn(async move { run_dkg(&context, &task_request, timer).await });
        self.tasks.push(SessionTask { request, handle });
    }

    /// Number of sessions spawned and not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every spawned session was joined
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every session at its next poll wait
    pub fn shutdown(&self) {
        tracing::info!(sessions = self.tasks.len(), "shutting down DKG sessions");
        self.shutdown.trigger();
    }

    /// Wait for every spawned session, in spawn order.
    ///
    /// A session task that panicked or was aborted is reported as `Failed`.
    pub async fn join_all(&mut self) -> Vec<(SessionRequest, DkgRunResult)> {
        let tasks = std::mem::take(&mut self.tasks);
        let (requests, handles): (Vec<_>, Vec<_>) =
            tasks.into_iter().map(|t| (t.request, t.handle)).unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(requests)
            .map(|(joined, request)| {
                let result = joined.unwrap_or_else(|err| {
                    tracing::error!(group = %request.group_name, error = %err, "DKG session task failed");
                    DkgRunResult::failed()
                });
                (request, result)
            })
            .collect()
    }
}
