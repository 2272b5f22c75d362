use async_trait::async_trait;

use crate::{
    stats::StatSnapshot,
    supervisor::handle::{SupervisorHandle, SupervisorHandleError},
};

/// The four operations a downloader daemon exposes.
///
/// Wire adapters translate requests onto this trait on the server side, and
/// the [`Client`](crate::Client) implements it on the calling side.
#[async_trait]
pub trait Downloader: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Starts streaming `url`.
    async fn add_task(&self, url: String) -> Result<(), Self::Error>;

    /// Current task counters.
    async fn status(&self) -> Result<StatSnapshot, Self::Error>;

    /// Stops every task.
    async fn stop(&self) -> Result<(), Self::Error>;

    /// Shuts the daemon down.
    async fn done(&self) -> Result<(), Self::Error>;
}

#[async_trait]
impl Downloader for SupervisorHandle {
    type Error = SupervisorHandleError;

    async fn add_task(&self, url: String) -> Result<(), Self::Error> {
        SupervisorHandle::add_task(self, url).await
    }

    async fn status(&self) -> Result<StatSnapshot, Self::Error> {
        Ok(SupervisorHandle::status(self))
    }

    async fn stop(&self) -> Result<(), Self::Error> {
        self.stop_all().await
    }

    async fn done(&self) -> Result<(), Self::Error> {
        self.shutdown();
        Ok(())
    }
}
