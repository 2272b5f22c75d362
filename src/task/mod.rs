mod watchdog;

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use reqwest::{Client, StatusCode};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use watchdog::Watchdog;

/// Lifecycle state of a [`DownloadTask`].
///
/// Transitions only move forward: `Connecting -> Active -> Error`, and
/// `Error` can be entered from any state but is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskStatus {
    Connecting = 0,
    Active = 1,
    Error = 2,
}

impl TaskStatus {
    pub fn is_connecting(&self) -> bool {
        matches!(self, TaskStatus::Connecting)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Active)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TaskStatus::Error)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Why a task reached [`TaskStatus::Error`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("perform request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("read failed: {0}")]
    Read(#[source] reqwest::Error),
    #[error("stream closed by remote")]
    StreamClosed,
    #[error("stopped")]
    Stopped,
}

/// Status cell shared between the supervisor and the task's own execution.
#[derive(Debug, Default)]
struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    fn load(&self) -> TaskStatus {
        TaskStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if it is further along than the current state.
    /// Returns `true` only for the call that performed the transition.
    fn advance(&self, next: TaskStatus) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct TaskState {
    status: AtomicStatus,
    received: AtomicU64,
}

/// One supervised HTTP GET stream.
///
/// Cloning is cheap and every clone refers to the same task: the supervisor
/// keeps one in its registry and the running future keeps another, which it
/// only uses to update the status and to cancel itself.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    url: Arc<str>,
    token: CancellationToken,
    idle_timeout: Duration,
    state: Arc<TaskState>,
}

impl DownloadTask {
    /// Creates a task whose cancellation scope is a child of `parent`.
    ///
    /// A zero `idle_timeout` disables the idle-read watchdog.
    pub fn new(
        url: impl Into<Arc<str>>,
        parent: &CancellationToken,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            token: parent.child_token(),
            idle_timeout,
            state: Arc::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status.load()
    }

    /// Bytes read from the response body so far.
    pub fn received(&self) -> u64 {
        self.state.received.load(Ordering::Relaxed)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Requests cancellation. Safe to call any number of times.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Starts the task on the runtime, tracked by `tracker`.
    pub fn run(&self, client: Client, tracker: &TaskTracker) {
        let task = self.clone();
        let watchdogs = tracker.clone();
        tracker.spawn(async move { task.process(client, watchdogs).await });
    }

    async fn process(self, client: Client, tracker: TaskTracker) {
        tracing::info!(url = %self.url, "connecting");
        let outcome = tokio::select! {
            _ = self.token.cancelled() => Err(TaskError::Stopped),
            outcome = self.stream(&client, &tracker) => outcome,
        };
        let reason = match outcome {
            Ok(never) => match never {},
            Err(reason) => reason,
        };

        // Releases the watchdog and anything else bound to this scope.
        self.token.cancel();
        if self.state.status.advance(TaskStatus::Error) {
            tracing::warn!(
                url = %self.url,
                received = self.received(),
                "{reason}"
            );
        }
    }

    async fn stream(
        &self,
        client: &Client,
        tracker: &TaskTracker,
    ) -> Result<Infallible, TaskError> {
        let mut response = client
            .get(&*self.url)
            .send()
            .await
            .map_err(TaskError::Request)?;
        if response.status() != StatusCode::OK {
            return Err(TaskError::UnexpectedStatus(response.status()));
        }

        let watchdog = Watchdog::spawn(self.url.clone(), self.idle_timeout, &self.token, tracker);
        tracing::info!(url = %self.url, "connected");
        self.state.status.advance(TaskStatus::Active);

        loop {
            match response.chunk().await.map_err(TaskError::Read)? {
                Some(chunk) => {
                    self.state
                        .received
                        .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    watchdog.progress();
                }
                None => return Err(TaskError::StreamClosed),
            }
        }
    }
}
