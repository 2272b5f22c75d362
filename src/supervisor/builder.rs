use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{stats::Statistics, Supervisor, SupervisorError};

/// Builds a `Supervisor` instance with configurable parameters.
///
/// Allows customization of the idle-read timeout given to tasks, the
/// statistics refresh and report cadence, the command queue bound and the
/// HTTP client shared by all tasks.
pub struct SupervisorBuilder {
    idle_timeout: Duration,
    statistics_interval: Duration,
    report_interval: Duration,
    command_capacity: usize,
    client: Option<reqwest::Client>,
    parent: Option<CancellationToken>,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            idle_timeout: Duration::ZERO,
            statistics_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(5),
            command_capacity: 8192,
            client: None,
            parent: None,
        }
    }

    /// Sets how long a task may go without receiving bytes before it is
    /// cancelled. Zero disables the watchdog.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the interval between statistics refreshes.
    pub fn with_statistics_interval(mut self, interval: Duration) -> Self {
        self.statistics_interval = interval;
        self
    }

    /// Sets the interval between statistics log lines.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Sets how many commands may wait in the queue before senders block.
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Uses `client` for every task instead of a default one.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Makes the supervisor scope a child of `token`, so cancelling it shuts
    /// the supervisor down.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build(self) -> Result<Supervisor, SupervisorError> {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .user_agent(concat!("downloader/", env!("CARGO_PKG_VERSION")))
                .build()?,
        };
        let token = match self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(self.command_capacity.max(1));
        Ok(Supervisor {
            tasks: Vec::new(),
            idle_timeout: self.idle_timeout,
            statistics_interval: non_zero(self.statistics_interval),
            report_interval: non_zero(self.report_interval),
            client,
            token,
            tracker: TaskTracker::new(),
            stats: Arc::new(Statistics::new()),
            tx,
            rx,
        })
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// `interval_at` panics on a zero period.
fn non_zero(interval: Duration) -> Duration {
    interval.max(Duration::from_millis(1))
}
