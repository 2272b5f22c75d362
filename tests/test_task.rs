mod common;

use std::time::{Duration, Instant};

use common::{eventually, start_server, Behavior};
use download_supervisor::{DownloadTask, TaskStatus};
use reqwest::Client;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

const DEADLINE: Duration = Duration::from_secs(5);

fn streaming() -> Behavior {
    Behavior::Stream {
        interval: Duration::from_millis(20),
    }
}

async fn drain(tracker: &TaskTracker) {
    tracker.close();
    tokio::time::timeout(DEADLINE, tracker.wait())
        .await
        .expect("task did not exit");
}

#[tokio::test]
async fn test_streaming_task_becomes_active() {
    let server = start_server(streaming()).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::ZERO);
    assert_eq!(task.status(), TaskStatus::Connecting);
    task.run(Client::new(), &tracker);

    assert!(eventually(DEADLINE, || task.status().is_active()).await);
    assert!(eventually(DEADLINE, || task.received() > 0).await);
    assert_eq!(server.requests(), 1);

    task.stop();
    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
}

#[tokio::test]
async fn test_remote_close_is_an_error() {
    let server = start_server(Behavior::Close).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::ZERO);
    task.run(Client::new(), &tracker);

    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
    assert!(task.is_stopped());
}

#[tokio::test]
async fn test_non_ok_status_is_an_error() {
    let server = start_server(Behavior::Status(404)).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::ZERO);
    task.run(Client::new(), &tracker);

    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
    assert_eq!(task.received(), 0);
}

#[tokio::test]
async fn test_invalid_url_is_an_error() {
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new("not a url", &root, Duration::ZERO);
    task.run(Client::new(), &tracker);

    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
}

#[tokio::test]
async fn test_refused_connection_is_an_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let root = CancellationToken::new();
    let tracker = TaskTracker::new();
    let task = DownloadTask::new(url, &root, Duration::ZERO);
    task.run(Client::new(), &tracker);

    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
}

#[tokio::test]
async fn test_silent_stream_hits_idle_timeout() {
    let server = start_server(Behavior::Silent).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();
    let idle_timeout = Duration::from_millis(200);

    let started = Instant::now();
    let task = DownloadTask::new(server.url.as_str(), &root, idle_timeout);
    task.run(Client::new(), &tracker);

    assert!(eventually(DEADLINE, || task.status().is_error()).await);
    assert!(started.elapsed() >= idle_timeout);
    drain(&tracker).await;
}

#[tokio::test]
async fn test_progress_keeps_idle_timeout_away() {
    let server = start_server(streaming()).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::from_millis(300));
    task.run(Client::new(), &tracker);
    assert!(eventually(DEADLINE, || task.status().is_active()).await);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(task.status(), TaskStatus::Active);

    task.stop();
    drain(&tracker).await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = start_server(streaming()).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::ZERO);
    task.run(Client::new(), &tracker);
    assert!(eventually(DEADLINE, || task.status().is_active()).await);

    task.stop();
    task.stop();
    drain(&tracker).await;
    task.stop();

    assert_eq!(task.status(), TaskStatus::Error);
    assert!(!root.is_cancelled());
}

#[tokio::test]
async fn test_stop_before_connecting() {
    let server = start_server(Behavior::Silent).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = DownloadTask::new(server.url.as_str(), &root, Duration::ZERO);
    task.stop();
    task.run(Client::new(), &tracker);

    drain(&tracker).await;
    assert_eq!(task.status(), TaskStatus::Error);
}

#[tokio::test]
async fn test_cancelling_parent_stops_tasks() {
    let server = start_server(streaming()).await;
    let root = CancellationToken::new();
    let tracker = TaskTracker::new();

    let tasks: Vec<_> = (0..3)
        .map(|_| DownloadTask::new(server.url.as_str(), &root, Duration::ZERO))
        .collect();
    for task in &tasks {
        task.run(Client::new(), &tracker);
    }
    assert!(eventually(DEADLINE, || tasks.iter().all(|t| t.status().is_active())).await);

    root.cancel();
    drain(&tracker).await;
    assert!(tasks.iter().all(|t| t.status().is_error()));
}
