//! Request/response messages and their two wire forms.
//!
//! Every exchange is one line from the client followed by one line from the
//! server. The [`Protocol::Text`] form is the plain command language
//! (`task <url>`, `ok`, `fail: "..."`); [`Protocol::Json`] carries the same
//! messages as JSON objects.

mod json;
mod text;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::stats::{ParseStatError, StatSnapshot};

/// Upper bound for a single protocol line, newline included.
pub const MAX_LINE: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{0}")]
    InvalidArguments(&'static str),
    #[error("malformed reply {0:?}")]
    MalformedReply(String),
    #[error(transparent)]
    Statistics(#[from] ParseStatError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("connection closed before a full line was received")]
    Closed,
    #[error("line exceeds {MAX_LINE} bytes")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A client request; one per [`Downloader`](crate::Downloader) operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    AddTask { url: String },
    Status,
    Stop,
    Done,
}

/// The server's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Status { stat: StatSnapshot },
    Fail { reason: String },
}

impl Reply {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

/// Wire form spoken on an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Protocol {
    #[default]
    Text,
    Json,
}

impl Protocol {
    pub fn encode_request(&self, request: &Request) -> Result<String, ProtocolError> {
        match self {
            Self::Text => Ok(text::encode_request(request)),
            Self::Json => json::encode(request),
        }
    }

    pub fn decode_request(&self, line: &str) -> Result<Request, ProtocolError> {
        match self {
            Self::Text => text::decode_request(line),
            Self::Json => json::decode(line),
        }
    }

    pub fn encode_reply(&self, reply: &Reply) -> Result<String, ProtocolError> {
        match self {
            Self::Text => Ok(text::encode_reply(reply)),
            Self::Json => json::encode(reply),
        }
    }

    pub fn decode_reply(&self, line: &str) -> Result<Reply, ProtocolError> {
        match self {
            Self::Text => text::decode_reply(line),
            Self::Json => json::decode(line),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Reads one newline-terminated line, without the terminator.
pub(crate) async fn read_line<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = reader.take(MAX_LINE).read_line(&mut line).await?;
    if read == 0 {
        return Err(ProtocolError::Closed);
    }
    if !line.ends_with('\n') {
        return Err(if read as u64 >= MAX_LINE {
            ProtocolError::LineTooLong
        } else {
            ProtocolError::Closed
        });
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

pub(crate) async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::BufReader;

    use super::*;

    #[tokio::test]
    async fn reads_lines_without_terminator() {
        let mut reader = BufReader::new(&b"status\r\ntask x\n"[..]);
        assert_eq!(read_line(&mut reader).await.unwrap(), "status");
        assert_eq!(read_line(&mut reader).await.unwrap(), "task x");
        assert!(matches!(read_line(&mut reader).await, Err(ProtocolError::Closed)));
    }

    #[tokio::test]
    async fn unterminated_line_is_rejected() {
        let mut reader = BufReader::new(&b"stat"[..]);
        assert!(matches!(read_line(&mut reader).await, Err(ProtocolError::Closed)));
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let long = vec![b'a'; MAX_LINE as usize + 10];
        let mut reader = BufReader::new(&long[..]);
        assert!(matches!(read_line(&mut reader).await, Err(ProtocolError::LineTooLong)));
    }

    #[tokio::test]
    async fn written_line_is_terminated() {
        let mut out = Vec::new();
        write_line(&mut out, "ok").await.unwrap();
        assert_eq!(out, b"ok\n");
    }

    #[test]
    fn both_forms_carry_the_same_messages() {
        let request = Request::AddTask {
            url: "http://example.com/".into(),
        };
        let reply = Reply::Status {
            stat: StatSnapshot::new(1, 0, 2),
        };
        for protocol in [Protocol::Text, Protocol::Json] {
            let line = protocol.encode_request(&request).unwrap();
            assert_eq!(protocol.decode_request(&line).unwrap(), request);
            let line = protocol.encode_reply(&reply).unwrap();
            assert_eq!(protocol.decode_reply(&line).unwrap(), reply);
        }
    }
}
