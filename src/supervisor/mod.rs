pub(crate) mod builder;
pub(crate) mod handle;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    stats::{StatSnapshot, Statistics},
    supervisor::handle::SupervisorHandle,
    task::DownloadTask,
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Commands accepted by the supervisor loop, applied in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SupervisorMessage {
    /// Creates a task for the URL and starts it.
    AddTask(String),
    /// Stops every registered task and clears the registry.
    StopAll,
}

/// Owner of the task registry.
///
/// All mutations arrive as [`SupervisorMessage`]s on one bounded channel and
/// are applied by a single loop, which also refreshes the shared
/// [`Statistics`] on a fixed interval. Cancelling the supervisor's token
/// shuts the loop down; every task scope is a child of that token.
pub struct Supervisor {
    tasks: Vec<DownloadTask>,
    idle_timeout: Duration,
    statistics_interval: Duration,
    report_interval: Duration,
    client: reqwest::Client,
    token: CancellationToken,
    tracker: TaskTracker,
    stats: Arc<Statistics>,
    tx: mpsc::Sender<SupervisorMessage>,
    rx: mpsc::Receiver<SupervisorMessage>,
}

impl Supervisor {
    /// Runs the supervisor, consuming it and returning a handle for external control.
    pub fn run(self) -> SupervisorHandle {
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let handle = SupervisorHandle::new(
            self.tx.clone(),
            self.token.clone(),
            self.stats.clone(),
            stopped_rx,
        );
        tokio::spawn(async move {
            self.run_and_supervise().await;
            let _ = stopped_tx.send(true);
        });
        handle
    }

    async fn run_and_supervise(mut self) {
        tracing::info!(idle_timeout = ?self.idle_timeout, "supervisor started");
        self.refresh_statistics();

        let start = Instant::now();
        let mut refresh = interval_at(start + self.statistics_interval, self.statistics_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = interval_at(start + self.report_interval, self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                Some(msg) = self.rx.recv() => {
                    self.handle_message(msg);
                },
                _ = refresh.tick() => {
                    self.refresh_statistics();
                },
                _ = report.tick() => {
                    tracing::info!("[status] {}", self.stats.get());
                }
            }
        }

        self.drain().await;
    }

    fn handle_message(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::AddTask(url) => {
                let task = DownloadTask::new(url, &self.token, self.idle_timeout);
                task.run(self.client.clone(), &self.tracker);
                self.tasks.push(task);
            }
            SupervisorMessage::StopAll => {
                tracing::info!(tasks = self.tasks.len(), "stopping all tasks");
                self.stop_all();
            }
        }
        self.refresh_statistics();
    }

    fn stop_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.stop();
        }
    }

    fn refresh_statistics(&self) {
        self.stats
            .set(StatSnapshot::from_statuses(self.tasks.iter().map(DownloadTask::status)));
    }

    /// Refuses further commands and waits for every task to exit.
    async fn drain(&mut self) {
        self.rx.close();
        self.stop_all();
        self.tracker.close();
        self.tracker.wait().await;
        self.refresh_statistics();
        tracing::info!("supervisor stopped");
    }
}
