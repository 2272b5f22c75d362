use std::sync::Arc;

use tokio::io::BufReader;

use crate::{
    endpoint::Stream,
    protocol::{read_line, write_line, Protocol, ProtocolError, Reply, Request},
    service::Downloader,
};

use super::IO_TIMEOUT;

/// Answers a single request on `stream`. Failures stay local to the
/// connection.
pub(super) async fn serve<D>(stream: Stream, protocol: Protocol, service: Arc<D>)
where
    D: Downloader,
{
    match tokio::time::timeout(IO_TIMEOUT, exchange(stream, protocol, &*service)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!("client exchange failed: {err}"),
        Err(_) => tracing::warn!(timeout = ?IO_TIMEOUT, "client exchange timed out"),
    }
}

async fn exchange<D>(stream: Stream, protocol: Protocol, service: &D) -> Result<(), ProtocolError>
where
    D: Downloader,
{
    let mut stream = BufReader::new(stream);
    let line = read_line(&mut stream).await?;
    let reply = match protocol.decode_request(&line) {
        Ok(request) => {
            tracing::debug!(?request, "request received");
            dispatch(service, request).await
        }
        Err(err) => {
            tracing::debug!(%line, "rejected request: {err}");
            Reply::fail("Cannot recognize command")
        }
    };
    write_line(&mut stream, &protocol.encode_reply(&reply)?).await
}

/// Maps a request onto the matching [`Downloader`] operation.
pub(super) async fn dispatch<D>(service: &D, request: Request) -> Reply
where
    D: Downloader + ?Sized,
{
    let result = match request {
        Request::AddTask { url } => service.add_task(url).await.map(|()| Reply::Ok),
        Request::Status => service.status().await.map(|stat| Reply::Status { stat }),
        Request::Stop => service.stop().await.map(|()| Reply::Ok),
        Request::Done => service.done().await.map(|()| Reply::Ok),
    };
    result.unwrap_or_else(|err| Reply::fail(err.to_string()))
}
