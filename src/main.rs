use std::process::ExitCode;

use clap::Parser;
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;

use download_supervisor::{cli::Cli, logging};

const FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let root = CancellationToken::new();
    let mut command = tokio::spawn(cli.command.execute(root.clone()));

    tokio::select! {
        outcome = &mut command => exit_code(outcome),
        _ = shutdown_signal() => {
            tracing::warn!("terminated");
            root.cancel();
            let _ = command.await;
            ExitCode::from(FAILURE)
        }
    }
}

fn exit_code(outcome: Result<anyhow::Result<()>, JoinError>) -> ExitCode {
    match outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            tracing::error!("{err:#}");
            ExitCode::from(FAILURE)
        }
        Err(err) => {
            tracing::error!("command aborted: {err}");
            ExitCode::from(FAILURE)
        }
    }
}

/// Resolves on SIGINT or SIGTERM. Never resolves if no handler can be installed.
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            tracing::warn!("cannot listen for SIGTERM: {err}");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(err) = interrupted {
                tracing::warn!("cannot listen for SIGINT: {err}");
                std::future::pending::<()>().await;
            }
        }
        _ = terminate.recv() => {}
    }
}
