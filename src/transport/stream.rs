use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use super::Abort;

#[derive(Debug)]
enum Inner {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    Aborted,
}

/// A connected TCP stream, optionally wrapped in TLS.
#[derive(Debug)]
pub struct Stream {
    inner: Inner,
    peer_addr: SocketAddr,
}

impl Stream {
    pub(super) fn tcp(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            inner: Inner::Tcp(stream),
            peer_addr,
        }
    }

    #[cfg(feature = "tls")]
    pub(super) fn tls(stream: tokio_rustls::client::TlsStream<TcpStream>, peer_addr: SocketAddr) -> Self {
        Self {
            inner: Inner::Tls(Box::new(stream)),
            peer_addr,
        }
    }

    /// The address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Is this stream encrypted with TLS?
    pub fn is_tls(&self) -> bool {
        match self.inner {
            #[cfg(feature = "tls")]
            Inner::Tls(_) => true,
            _ => false,
        }
    }

    fn tcp_ref(&self) -> Option<&TcpStream> {
        match &self.inner {
            Inner::Tcp(stream) => Some(stream),
            #[cfg(feature = "tls")]
            Inner::Tls(stream) => Some(stream.get_ref().0),
            Inner::Aborted => None,
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream aborted")
}

impl Abort for Stream {
    fn abort(&mut self) -> io::Result<()> {
        let Some(tcp) = self.tcp_ref() else {
            return Ok(());
        };

        // Zero linger turns the close into a reset instead of a graceful FIN.
        let result = socket2::SockRef::from(tcp).set_linger(Some(Duration::ZERO));
        self.inner = Inner::Aborted;
        tracing::trace!(peer.addr = %self.peer_addr, "stream aborted");
        result
    }

    fn is_aborted(&self) -> bool {
        matches!(self.inner, Inner::Aborted)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            Inner::Aborted => Poll::Ready(Err(aborted())),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            Inner::Aborted => Poll::Ready(Err(aborted())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            Inner::Aborted => Poll::Ready(Err(aborted())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            Inner::Aborted => Poll::Ready(Err(aborted())),
        }
    }
}
