//! In-memory transport for in-process peers and tests.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use super::{Abort, ConnectError, Transport, TransportConfig};
use crate::BoxFuture;

/// Create a connected transport/acceptor pair.
///
/// Each call to [`Transport::connect`] on the transport creates a new in-memory stream
/// whose other half is delivered to [`DuplexIncoming::accept`].
pub fn pair(max_buf_size: usize) -> (DuplexTransport, DuplexIncoming) {
    let (tx, rx) = mpsc::channel(32);
    (
        DuplexTransport { max_buf_size, tx },
        DuplexIncoming { rx },
    )
}

/// Transport via duplex stream
#[derive(Debug, Clone)]
pub struct DuplexTransport {
    max_buf_size: usize,
    tx: mpsc::Sender<tokio::io::DuplexStream>,
}

impl DuplexTransport {
    /// Create a new transport/acceptor pair, see [`pair`].
    pub fn pair(max_buf_size: usize) -> (Self, DuplexIncoming) {
        pair(max_buf_size)
    }
}

impl Transport for DuplexTransport {
    type IO = DuplexStream;

    fn connect<'a>(
        &'a self,
        config: &'a TransportConfig,
    ) -> BoxFuture<'a, Result<Self::IO, ConnectError>> {
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(self.max_buf_size);
            self.tx.send(server).await.map_err(|_| {
                ConnectError::build(
                    "duplex connect error",
                    io::Error::from(io::ErrorKind::ConnectionRefused),
                )
            })?;
            tracing::trace!(host = %config.host(), "duplex connected");
            Ok(DuplexStream { inner: Some(client) })
        })
    }
}

/// Receives the server half of each duplex connection.
#[derive(Debug)]
pub struct DuplexIncoming {
    rx: mpsc::Receiver<tokio::io::DuplexStream>,
}

impl DuplexIncoming {
    /// Wait for the next connection. Returns `None` once every transport is dropped.
    pub async fn accept(&mut self) -> Option<tokio::io::DuplexStream> {
        self.rx.recv().await
    }
}

/// Client half of a duplex connection.
#[derive(Debug)]
pub struct DuplexStream {
    inner: Option<tokio::io::DuplexStream>,
}

impl DuplexStream {
    fn inner(self: Pin<&mut Self>) -> io::Result<Pin<&mut tokio::io::DuplexStream>> {
        match self.get_mut().inner.as_mut() {
            Some(inner) => Ok(Pin::new(inner)),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "stream aborted")),
        }
    }
}

impl Abort for DuplexStream {
    fn abort(&mut self) -> io::Result<()> {
        if self.inner.take().is_some() {
            tracing::trace!("duplex stream aborted");
        }
        Ok(())
    }

    fn is_aborted(&self) -> bool {
        self.inner.is_none()
    }
}

impl AsyncRead for DuplexStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.inner() {
            Ok(inner) => inner.poll_read(cx, buf),
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.inner() {
            Ok(inner) => inner.poll_write(cx, buf),
            Err(error) => Poll::Ready(Err(error)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner() {
            Ok(inner) => inner.poll_flush(cx),
            Err(error) => Poll::Ready(Err(error)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner() {
            Ok(inner) => inner.poll_shutdown(cx),
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_duplex_transport() {
        let (transport, mut incoming) = pair(1024);
        let config = TransportConfig::Plain {
            host: "duplex".into(),
            port: 5672,
        };

        let (stream, server) = tokio::join!(transport.connect(&config), incoming.accept());
        let mut stream = stream.unwrap();
        let mut server = server.unwrap();

        stream.write_all(b"AMQP").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AMQP");
    }

    #[tokio::test]
    async fn test_abort_closes_peer() {
        let (transport, mut incoming) = pair(1024);
        let config = TransportConfig::Plain {
            host: "duplex".into(),
            port: 5672,
        };

        let (stream, server) = tokio::join!(transport.connect(&config), incoming.accept());
        let mut stream = stream.unwrap();
        let mut server = server.unwrap();

        stream.abort().unwrap();
        assert!(stream.is_aborted());

        let mut buf = Vec::new();
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refused_without_acceptor() {
        let (transport, incoming) = pair(1024);
        drop(incoming);
        let config = TransportConfig::Plain {
            host: "duplex".into(),
            port: 5672,
        };
        assert!(transport.connect(&config).await.is_err());
    }
}
