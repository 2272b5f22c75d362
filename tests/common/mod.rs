//! Scripted HTTP server and helpers shared by the integration tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use download_supervisor::{SupervisorBuilder, SupervisorHandle};

/// How the test server answers every request.
#[derive(Debug, Clone, Copy)]
#[allow(unused)]
pub enum Behavior {
    /// 200 followed by a chunk every `interval`, forever.
    Stream { interval: Duration },
    /// 200 with headers only, then the connection stays open and quiet.
    Silent,
    /// 200 with a short body, then the connection is closed.
    Close,
    /// The given status code with an empty body.
    Status(u16),
}

pub struct TestServer {
    pub url: String,
    requests: Arc<AtomicUsize>,
}

#[allow(unused)]
impl TestServer {
    /// Requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server answering every request with `behavior`. It runs until
/// the test's runtime shuts down.
#[allow(unused)]
pub async fn start_server(behavior: Behavior) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(respond(stream, behavior));
        }
    });
    TestServer {
        url: format!("http://127.0.0.1:{port}/"),
        requests,
    }
}

async fn respond(mut stream: TcpStream, behavior: Behavior) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    const STREAM_HEAD: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n";
    match behavior {
        Behavior::Stream { interval } => {
            if stream.write_all(STREAM_HEAD).await.is_err() {
                return;
            }
            loop {
                if stream.write_all(&[0u8; 512]).await.is_err() {
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        }
        Behavior::Silent => {
            if stream.write_all(STREAM_HEAD).await.is_err() {
                return;
            }
            // Quiet until the client hangs up.
            let _ = stream.read(&mut buf).await;
        }
        Behavior::Close => {
            let _ = stream.write_all(STREAM_HEAD).await;
            let _ = stream.write_all(b"short body").await;
            let _ = stream.shutdown().await;
        }
        Behavior::Status(code) => {
            let head = format!(
                "HTTP/1.1 {code} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    }
}

/// A supervisor with fast statistics refreshes, already running.
#[allow(unused)]
pub fn create_supervisor_and_get_handle(idle_timeout: Duration) -> SupervisorHandle {
    SupervisorBuilder::new()
        .with_idle_timeout(idle_timeout)
        .with_statistics_interval(Duration::from_millis(20))
        .build()
        .unwrap()
        .run()
}

/// Polls `condition` every 20ms until it holds or `deadline` passes.
#[allow(unused)]
pub async fn eventually(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let give_up = tokio::time::Instant::now() + deadline;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= give_up {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
