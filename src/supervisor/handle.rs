use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    stats::{StatSnapshot, Statistics},
    supervisor::SupervisorMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorHandleError {
    #[error("supervisor no longer accepts commands")]
    SendError,
    #[error("supervisor exited before finishing its shutdown")]
    Crashed,
}

/// Cloneable control surface of a running [`Supervisor`](crate::Supervisor).
///
/// Commands are queued on a bounded channel, so `add_task` and `stop_all`
/// wait for room when the supervisor falls behind. Statistics are read
/// directly from the shared snapshot.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMessage>,
    token: CancellationToken,
    stats: Arc<Statistics>,
    stopped: watch::Receiver<bool>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SupervisorMessage>,
        token: CancellationToken,
        stats: Arc<Statistics>,
        stopped: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tx,
            token,
            stats,
            stopped,
        }
    }

    /// Queues a new download task for `url`.
    pub async fn add_task(&self, url: impl Into<String>) -> Result<(), SupervisorHandleError> {
        self.send(SupervisorMessage::AddTask(url.into())).await
    }

    /// Queues a request to stop every task and clear the registry.
    ///
    /// Returns once the request is queued, not once tasks have exited.
    pub async fn stop_all(&self) -> Result<(), SupervisorHandleError> {
        self.send(SupervisorMessage::StopAll).await
    }

    /// Latest statistics snapshot.
    pub fn status(&self) -> StatSnapshot {
        self.stats.get()
    }

    /// Cancels the supervisor scope, and with it every task.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled when the supervisor starts shutting down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits until the supervisor has stopped and every task has exited.
    pub async fn wait(&self) -> Result<(), SupervisorHandleError> {
        let mut stopped = self.stopped.clone();
        stopped
            .wait_for(|stopped| *stopped)
            .await
            .map(|_| ())
            .map_err(|_| SupervisorHandleError::Crashed)
    }

    async fn send(&self, msg: SupervisorMessage) -> Result<(), SupervisorHandleError> {
        if self.token.is_cancelled() {
            return Err(SupervisorHandleError::SendError);
        }
        self.tx
            .send(msg)
            .await
            .map_err(|_| SupervisorHandleError::SendError)
    }
}
