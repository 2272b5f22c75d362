//! # download-supervisor
//!
//! `download-supervisor` keeps a set of HTTP stream downloads running and
//! tells you how they are doing.
//! A single supervisor loop owns every task, applies commands in the order
//! they arrive, and publishes aggregate counters on a timer.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use download_supervisor::SupervisorBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = SupervisorBuilder::new()
//!         .with_idle_timeout(Duration::from_secs(30))
//!         .build()?
//!         .run();
//!
//!     handle.add_task("http://example.com/live").await?;
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     println!("{}", handle.status()); // active:1,failed:0,pending:0
//!
//!     handle.shutdown();
//!     handle.wait().await?; // every task has exited
//!     Ok(())
//! }
//! ```
//!
//! ## What you get
//!
//! * **Task lifecycle** – each URL is streamed by its own task that moves
//!   `connecting -> active -> error`; any failure, stop or idle timeout ends it.
//! * **Ordered control** – add and stop-all requests go through one bounded
//!   channel, so they are applied exactly in submission order.
//! * **Two wire forms** – a line-based text protocol and a JSON one, served
//!   over a unix socket or TCP, both mapped onto the [`Downloader`] trait.
//! * **Worker pool** – a bounded job queue with backpressure, used by the
//!   URL health checker.
//!
//! ## API overview
//!
//! | SupervisorHandle method | Purpose                                        |
//! | ----------------------- | ---------------------------------------------- |
//! | `add_task(url).await`   | Start streaming a URL                          |
//! | `stop_all().await`      | Stop every task and clear the registry         |
//! | `status()`              | Latest `StatSnapshot` (`active`, `failed`, …)  |
//! | `shutdown()`            | Cancel the supervisor and all tasks            |
//! | `wait().await`          | Wait until every task has exited               |

pub use client::{Client, ClientError};
pub use endpoint::{Endpoint, EndpointError, DEFAULT_ENDPOINT};
pub use health::{HealthCheckOptions, HealthChecker, HealthReport, ProbeError};
pub use pool::{PoolError, WorkerPool};
pub use protocol::{Protocol, ProtocolError, Reply, Request};
pub use server::{Server, ServerConfig, ServerError};
pub use service::Downloader;
pub use stats::{StatSnapshot, Statistics};
pub use supervisor::{
    builder::SupervisorBuilder,
    handle::{SupervisorHandle, SupervisorHandleError},
    Supervisor, SupervisorError,
};
pub use task::{DownloadTask, TaskError, TaskStatus};

pub mod cli;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod stats;

mod client;
mod endpoint;
mod health;
mod pool;
mod service;
mod supervisor;
mod task;
