//! Batch URL health checking on a [`WorkerPool`].
//!
//! Each URL is probed with a GET that must answer `200 OK` and deliver some
//! body within the probe timeout. URLs passing the probe are written to the
//! output, one per line, by a single writer task.

use std::{io, time::Duration};

use reqwest::{Client, StatusCode};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};

use crate::pool::{PoolError, WorkerPool};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),
    #[error("no body received")]
    EmptyBody,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Checks that `url` answers `200 OK` with a non-empty body within `timeout`.
pub async fn probe(client: &Client, url: &str, timeout: Duration) -> Result<(), ProbeError> {
    let attempt = async {
        let mut response = client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ProbeError::UnexpectedStatus(response.status()));
        }
        match response.chunk().await? {
            Some(chunk) if !chunk.is_empty() => Ok(()),
            _ => Err(ProbeError::EmptyBody),
        }
    };
    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
}

#[derive(Debug, Clone, Copy)]
pub struct HealthCheckOptions {
    pub timeout: Duration,
    pub workers: usize,
    pub queue: usize,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            workers: 10,
            queue: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub accessible: usize,
    pub total: usize,
}

pub struct HealthChecker {
    pool: WorkerPool,
    client: Client,
    timeout: Duration,
    accessible: mpsc::Sender<String>,
    writer: JoinHandle<io::Result<usize>>,
    total: usize,
}

impl HealthChecker {
    pub fn new<W>(output: W, options: HealthCheckOptions) -> Result<Self, reqwest::Error>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let client = Client::builder().build()?;
        let (tx, rx) = mpsc::channel(options.queue.max(1));
        Ok(Self {
            pool: WorkerPool::new(options.workers, options.queue),
            client,
            timeout: options.timeout,
            accessible: tx,
            writer: tokio::spawn(write_lines(output, rx)),
            total: 0,
        })
    }

    /// Queues a probe of `url`, waiting while the pool's queue is full.
    pub async fn check(&mut self, url: impl Into<String>) -> Result<(), PoolError> {
        let url = url.into();
        let client = self.client.clone();
        let timeout = self.timeout;
        let accessible = self.accessible.clone();
        self.pool
            .submit(async move {
                match probe(&client, &url, timeout).await {
                    Ok(()) => {
                        if let Err(lost) = accessible.send(url).await {
                            tracing::debug!(url = %lost.0, "output writer gone, url not recorded");
                        }
                    }
                    Err(err) => tracing::info!(%url, "not accessible: {err}"),
                }
            })
            .await?;
        self.total += 1;
        Ok(())
    }

    /// Waits for every queued probe, flushes the output and stops the pool.
    pub async fn finish(self) -> io::Result<HealthReport> {
        let Self {
            pool,
            accessible,
            writer,
            total,
            ..
        } = self;

        pool.wait_for_idle().await;
        drop(accessible);
        let written = writer.await.map_err(io::Error::other)?;
        pool.shutdown().await;

        Ok(HealthReport {
            accessible: written?,
            total,
        })
    }
}

async fn write_lines<W>(mut output: W, mut lines: mpsc::Receiver<String>) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        written += 1;
    }
    output.flush().await?;
    Ok(written)
}
