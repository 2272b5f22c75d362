use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,
}

/// Count of jobs submitted but not yet completed.
#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed set of workers draining a bounded FIFO job queue.
///
/// `submit` waits for room in the queue instead of dropping work. Every
/// accepted job runs exactly once; a panicking job is contained and still
/// counts as completed.
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    pending: Arc<Pending>,
    token: CancellationToken,
    workers: TaskTracker,
}

impl WorkerPool {
    /// Starts `workers` consumers over a queue holding up to `capacity` jobs.
    /// Both values are raised to at least one.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(Pending::default());
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for worker in 0..workers.max(1) {
            tracker.spawn(Self::work(worker, rx.clone(), pending.clone(), token.clone()));
        }
        tracker.close();

        Self {
            tx,
            pending,
            token,
            workers: tracker,
        }
    }

    /// Queues `job`, waiting while the queue is full. Dropping the returned
    /// future before it completes leaves the job unsubmitted.
    ///
    /// Workers only stop once the pool is consumed by [`shutdown`](Self::shutdown)
    /// or dropped, so [`PoolError::Closed`] is only seen if the queue's
    /// receiving side is gone.
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.tx.reserve().await.map_err(|_| PoolError::Closed)?;
        self.pending.add();
        permit.send(Box::pin(job));
        Ok(())
    }

    /// Jobs submitted and not yet completed.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Returns once every job submitted so far has completed.
    pub async fn wait_for_idle(&self) {
        loop {
            let idle = self.pending.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stops the workers and waits for them to exit.
    ///
    /// Jobs already running finish; queued jobs are not started. Returns how
    /// many queued jobs were discarded.
    pub async fn shutdown(self) -> usize {
        self.token.cancel();
        self.workers.wait().await;
        let discarded = self.pending();
        if discarded > 0 {
            tracing::warn!(discarded, "worker pool shut down with queued jobs");
        }
        discarded
    }

    async fn work(
        worker: usize,
        rx: Arc<Mutex<mpsc::Receiver<Job>>>,
        pending: Arc<Pending>,
        token: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                job = async { rx.lock().await.recv().await } => job,
            };
            let Some(job) = job else {
                break;
            };
            if let Err(err) = tokio::spawn(job).await {
                tracing::warn!(worker, "job failed: {err}");
            }
            pending.done();
        }
        tracing::debug!(worker, "worker stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
