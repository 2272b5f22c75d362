use std::{io, time::Duration};

use async_trait::async_trait;
use tokio::io::BufReader;

use crate::{
    endpoint::Endpoint,
    protocol::{read_line, write_line, Protocol, ProtocolError, Reply, Request},
    service::Downloader,
    stats::StatSnapshot,
};

/// Default deadline for connecting, sending and reading the reply.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect to the server at {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error("server did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("server refused the request: {0}")]
    Rejected(String),
    #[error("unexpected reply {0:?}")]
    UnexpectedReply(Reply),
}

/// Remote end of a downloader daemon. Opens one connection per request.
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Endpoint,
    protocol: Protocol,
    timeout: Duration,
}

impl Client {
    pub fn new(endpoint: Endpoint, protocol: Protocol) -> Self {
        Self {
            endpoint,
            protocol,
            timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Sends `request` and returns the server's reply as is.
    pub async fn execute(&self, request: &Request) -> Result<Reply, ClientError> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }

    async fn exchange(&self, request: &Request) -> Result<Reply, ClientError> {
        let stream = self
            .endpoint
            .connect()
            .await
            .map_err(|source| ClientError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let mut stream = BufReader::new(stream);
        write_line(&mut stream, &self.protocol.encode_request(request)?).await?;
        let line = read_line(&mut stream).await?;
        Ok(self.protocol.decode_reply(&line)?)
    }

    async fn expect_ok(&self, request: Request) -> Result<(), ClientError> {
        match self.execute(&request).await? {
            Reply::Ok => Ok(()),
            Reply::Fail { reason } => Err(ClientError::Rejected(reason)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }
}

#[async_trait]
impl Downloader for Client {
    type Error = ClientError;

    async fn add_task(&self, url: String) -> Result<(), ClientError> {
        self.expect_ok(Request::AddTask { url }).await
    }

    async fn status(&self) -> Result<StatSnapshot, ClientError> {
        match self.execute(&Request::Status).await? {
            Reply::Status { stat } => Ok(stat),
            Reply::Fail { reason } => Err(ClientError::Rejected(reason)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.expect_ok(Request::Stop).await
    }

    async fn done(&self) -> Result<(), ClientError> {
        self.expect_ok(Request::Done).await
    }
}
