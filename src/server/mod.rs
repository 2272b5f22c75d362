mod connection;

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    endpoint::{Endpoint, Listener},
    protocol::Protocol,
    service::Downloader,
    supervisor::{builder::SupervisorBuilder, handle::SupervisorHandleError},
    SupervisorError,
};

/// Deadline for a whole request/reply exchange on the server side.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Fatal startup and shutdown failures. Per-connection failures are only
/// logged.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot recreate unix socket {}: {source}", path.display())]
    RecreateSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("listen on {endpoint} failed: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Handle(#[from] SupervisorHandleError),
}

/// Settings for [`run`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    pub protocol: Protocol,
    /// Idle-read timeout handed to every task; zero disables it.
    pub idle_timeout: Duration,
}

/// Accept loop translating wire requests onto a [`Downloader`].
#[derive(Debug)]
pub struct Server {
    listener: Listener,
    protocol: Protocol,
}

impl Server {
    /// Binds `endpoint`, replacing a stale unix socket file if there is one.
    pub async fn bind(endpoint: &Endpoint, protocol: Protocol) -> Result<Self, ServerError> {
        if let Endpoint::Unix(path) = endpoint {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ServerError::RecreateSocket {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        let listener = Listener::bind(endpoint)
            .await
            .map_err(|source| ServerError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        Ok(Self { listener, protocol })
    }

    /// Endpoint clients should dial to reach this server.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        self.listener.local_endpoint()
    }

    /// Serves clients until `shutdown` is cancelled, then waits for open
    /// connections to finish and removes the socket file.
    pub async fn serve<D>(self, service: Arc<D>, shutdown: CancellationToken)
    where
        D: Downloader + 'static,
    {
        let connections = TaskTracker::new();
        let endpoint = self
            .listener
            .local_endpoint()
            .map(|endpoint| endpoint.to_string())
            .unwrap_or_default();
        tracing::info!(%endpoint, protocol = %self.protocol, "server started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        let service = service.clone();
                        connections.spawn(connection::serve(stream, self.protocol, service));
                    }
                    Err(err) => tracing::warn!("accept failed: {err}"),
                },
            }
        }

        connections.close();
        connections.wait().await;
        if let Some(path) = self.listener.socket_path() {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "cannot remove socket: {err}");
            }
        }
        tracing::info!("server stopped");
    }
}

/// Runs the daemon: a supervisor behind a server on `config.endpoint`.
///
/// Returns after `done` was requested or `root` was cancelled, once every
/// task has exited.
pub async fn run(config: &ServerConfig, root: CancellationToken) -> Result<(), ServerError> {
    let supervisor = SupervisorBuilder::new()
        .with_idle_timeout(config.idle_timeout)
        .with_cancellation_token(root)
        .build()?;
    let server = Server::bind(&config.endpoint, config.protocol).await?;

    let handle = supervisor.run();
    server
        .serve(Arc::new(handle.clone()), handle.cancellation_token())
        .await;

    handle.shutdown();
    handle.wait().await?;
    Ok(())
}
