use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Idle-read watchdog for a streaming task.
///
/// The reader records progress without ever blocking: each record overwrites
/// the previous one. A separate tracked task cancels the task's scope once
/// `timeout` elapses without a record.
pub(crate) struct Watchdog {
    progress: Option<watch::Sender<Instant>>,
}

impl Watchdog {
    /// A zero `timeout` yields an inert watchdog.
    pub(crate) fn spawn(
        url: Arc<str>,
        timeout: Duration,
        token: &CancellationToken,
        tracker: &TaskTracker,
    ) -> Self {
        if timeout.is_zero() {
            return Self { progress: None };
        }

        let (tx, rx) = watch::channel(Instant::now());
        tracker.spawn(Self::watch(url, timeout, token.clone(), rx));
        Self { progress: Some(tx) }
    }

    pub(crate) fn progress(&self) {
        if let Some(tx) = &self.progress {
            tx.send_replace(Instant::now());
        }
    }

    async fn watch(
        url: Arc<str>,
        timeout: Duration,
        token: CancellationToken,
        mut progress: watch::Receiver<Instant>,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                changed = progress.changed() => {
                    // Reader is gone, nothing left to guard.
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(url = %url, ?timeout, "read timeout expired");
                    token.cancel();
                    return;
                }
            }
        }
    }
}
