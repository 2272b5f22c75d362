use std::{
    fmt, io,
    path::{Path, PathBuf},
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpListener, TcpStream, UnixListener, UnixStream},
};
use percent_encoding::percent_decode_str;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "unix:///tmp/downloader.sock";

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid endpoint {endpoint:?}: {source}")]
    Url {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported endpoint schema: {0}")]
    UnsupportedScheme(String),
    #[error("endpoint {0:?} has no socket path")]
    MissingPath(String),
    #[error("endpoint {0:?} needs a host and a port")]
    MissingAddress(String),
    #[error("unix endpoint {0:?} must not name a host, use unix:///<path>")]
    UnexpectedHost(String),
    #[error("endpoint {0:?} has a socket path that is not valid UTF-8")]
    InvalidPath(String),
}

/// Where the daemon listens: `unix://<path>` or `tcp://<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    pub(crate) async fn connect(&self) -> io::Result<Stream> {
        match self {
            Self::Unix(path) => UnixStream::connect(path).await.map(Stream::Unix),
            Self::Tcp(addr) => TcpStream::connect(addr).await.map(Stream::Tcp),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from("/tmp/downloader.sock"))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|source| EndpointError::Url {
            endpoint: s.to_string(),
            source,
        })?;
        match url.scheme() {
            "unix" => {
                if url.host_str().is_some_and(|host| !host.is_empty()) {
                    return Err(EndpointError::UnexpectedHost(s.to_string()));
                }
                if url.path().is_empty() {
                    return Err(EndpointError::MissingPath(s.to_string()));
                }
                let path = percent_decode_str(url.path())
                    .decode_utf8()
                    .map_err(|_| EndpointError::InvalidPath(s.to_string()))?;
                Ok(Self::Unix(PathBuf::from(path.as_ref())))
            }
            "tcp" => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) if !host.is_empty() => {
                    Ok(Self::Tcp(format!("{host}:{port}")))
                }
                _ => Err(EndpointError::MissingAddress(s.to_string())),
            },
            other => Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// A bound endpoint.
#[derive(Debug)]
pub(crate) enum Listener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl Listener {
    /// Binds `endpoint`. A unix socket file must not exist yet.
    pub(crate) async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => Ok(Self::Unix {
                listener: UnixListener::bind(path)?,
                path: path.clone(),
            }),
            Endpoint::Tcp(addr) => TcpListener::bind(addr).await.map(Self::Tcp),
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Unix { listener, .. } => listener.accept().await.map(|(s, _)| Stream::Unix(s)),
            Self::Tcp(listener) => listener.accept().await.map(|(s, _)| Stream::Tcp(s)),
        }
    }

    /// The endpoint clients should dial, with any TCP port 0 resolved.
    pub(crate) fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
            Self::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
        }
    }

    pub(crate) fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix { path, .. } => Some(path),
            Self::Tcp(_) => None,
        }
    }
}

/// A connected client or server stream over either transport.
#[derive(Debug)]
pub(crate) enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
