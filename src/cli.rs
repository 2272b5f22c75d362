//! Command line of the `downloader` binary.

use std::{future::Future, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::{
    endpoint::{Endpoint, DEFAULT_ENDPOINT},
    health::{HealthCheckOptions, HealthChecker, HealthReport},
    protocol::Protocol,
    server::{self, ServerConfig},
    Client, Downloader,
};

#[derive(Debug, Parser)]
#[command(name = "downloader", version)]
#[command(about = "Supervises concurrent HTTP stream downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where to find the server and how to talk to it.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// `unix://<path>` or `tcp://<host>:<port>`.
    #[arg(long, env = "DOWNLOADER_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,

    /// Wire protocol spoken on the endpoint.
    #[arg(long, value_enum, default_value_t = Protocol::Text)]
    pub protocol: Protocol,
}

impl ConnectionArgs {
    fn client(&self) -> Client {
        Client::new(self.endpoint.clone(), self.protocol)
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the server.
    Server {
        /// Read timeout for HTTP streams, in seconds. 0 disables it.
        #[arg(long, default_value_t = 0, value_name = "SECS")]
        timeout: u64,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Add a download task.
    Task {
        /// HTTP URL to stream.
        url: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print server statistics.
    Status {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Stop all tasks.
    Stop {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Tear the server down.
    Done {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Probe a list of URLs and write the accessible ones to a file.
    Check {
        /// File with one HTTP URL per line.
        #[arg(short, long)]
        input: PathBuf,

        /// File receiving the accessible URLs.
        #[arg(short, long)]
        output: PathBuf,

        /// Per-URL request timeout, in seconds.
        #[arg(short, long, default_value_t = 20, value_name = "SECS")]
        timeout: u64,

        /// Concurrent probes.
        #[arg(long, default_value_t = 10)]
        workers: usize,

        /// Probes queued ahead of the workers.
        #[arg(long, default_value_t = 100)]
        queue: usize,
    },
}

impl CliCommand {
    /// Runs the command. Cancelling `root` shuts a server down gracefully and
    /// abandons any other command.
    pub async fn execute(self, root: CancellationToken) -> Result<()> {
        match self {
            Self::Server {
                timeout,
                connection,
            } => {
                let config = ServerConfig {
                    endpoint: connection.endpoint,
                    protocol: connection.protocol,
                    idle_timeout: Duration::from_secs(timeout),
                };
                server::run(&config, root).await?;
            }
            Self::Task { url, connection } => {
                let client = connection.client();
                cancellable(&root, client.add_task(url)).await?;
                tracing::info!("ok");
            }
            Self::Status { connection } => {
                let client = connection.client();
                let stat = cancellable(&root, client.status()).await?;
                println!("{stat}");
            }
            Self::Stop { connection } => {
                let client = connection.client();
                cancellable(&root, client.stop()).await?;
                tracing::info!("ok");
            }
            Self::Done { connection } => {
                let client = connection.client();
                cancellable(&root, client.done()).await?;
                tracing::info!("ok");
            }
            Self::Check {
                input,
                output,
                timeout,
                workers,
                queue,
            } => {
                let options = HealthCheckOptions {
                    timeout: Duration::from_secs(timeout),
                    workers,
                    queue,
                };
                let report = cancellable(&root, check_urls(input, output, options)).await?;
                tracing::info!("Accessible URLs: {}/{}", report.accessible, report.total);
            }
        }
        Ok(())
    }
}

async fn cancellable<T, E, F>(root: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    tokio::select! {
        _ = root.cancelled() => Err(anyhow!("terminated")),
        result = operation => result.map_err(Into::into).context("cannot process command"),
    }
}

async fn check_urls(
    input: PathBuf,
    output: PathBuf,
    options: HealthCheckOptions,
) -> Result<HealthReport> {
    let input_file = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("open input file {} failed", input.display()))?;
    let output_file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("open output file {} failed", output.display()))?;

    let mut checker = HealthChecker::new(output_file, options)?;
    let mut lines = BufReader::new(input_file).lines();
    while let Some(line) = lines.next_line().await? {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        checker.check(url).await?;
    }
    Ok(checker.finish().await?)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_server_flags() {
        let cli = Cli::try_parse_from([
            "downloader",
            "server",
            "--timeout",
            "30",
            "--endpoint",
            "tcp://127.0.0.1:7000",
            "--protocol",
            "json",
        ])
        .unwrap();
        match cli.command {
            CliCommand::Server {
                timeout,
                connection,
            } => {
                assert_eq!(timeout, 30);
                assert_eq!(connection.endpoint, Endpoint::Tcp("127.0.0.1:7000".into()));
                assert_eq!(connection.protocol, Protocol::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn task_requires_a_url() {
        assert!(Cli::try_parse_from(["downloader", "task"]).is_err());
        let cli = Cli::try_parse_from(["downloader", "task", "http://example.com/"]).unwrap();
        assert!(matches!(cli.command, CliCommand::Task { url, .. } if url == "http://example.com/"));
    }

    #[test]
    fn rejects_unknown_endpoint_schemes() {
        assert!(Cli::try_parse_from(["downloader", "status", "--endpoint", "http://x:1"]).is_err());
    }

    #[test]
    fn check_uses_short_flags() {
        let cli =
            Cli::try_parse_from(["downloader", "check", "-i", "in.txt", "-o", "out.txt", "-t", "3"])
                .unwrap();
        match cli.command {
            CliCommand::Check {
                input,
                output,
                timeout,
                workers,
                queue,
            } => {
                assert_eq!(input, PathBuf::from("in.txt"));
                assert_eq!(output, PathBuf::from("out.txt"));
                assert_eq!((timeout, workers, queue), (3, 10, 100));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
