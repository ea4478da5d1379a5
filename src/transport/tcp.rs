//! TCP transport, with TLS layered on for secure configurations.
//!
//! Normally, you will not need to use this module directly. The
//! [`ConnectionFactory`][crate::ConnectionFactory] uses a [`TcpTransport`] by default.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};
use tracing::{trace, warn, Instrument};

use super::happy_eyeballs::{interleave, StaggerError, Staggered};
use super::{ConnectError, Stream, Transport, TransportConfig};
use crate::BoxFuture;

/// Connects to brokers over TCP.
///
/// Host names are resolved with the system resolver. Resolved addresses are raced,
/// each attempt starting [`happy_eyeballs_delay`](TcpTransportConfig::happy_eyeballs_delay)
/// after the previous one, and the first to connect wins. Secure configurations then run a
/// TLS handshake against the configuration's `tls_target_host`.
///
/// # Example
/// ```no_run
/// # use amqp_connect::transport::{Transport, TcpTransport, TransportConfig};
/// # async fn run() {
/// let transport = TcpTransport::default();
/// let config = TransportConfig::Plain { host: "localhost".into(), port: 5672 };
/// let stream = transport.connect(&config).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: Arc<TcpTransportConfig>,
    #[cfg(feature = "tls")]
    tls: Option<Arc<rustls::ClientConfig>>,
}

/// Builder for a [`TcpTransport`].
#[derive(Debug, Default)]
pub struct TcpTransportBuilder {
    config: TcpTransportConfig,
    #[cfg(feature = "tls")]
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl TcpTransportBuilder {
    /// Access the TCP connection configuration
    pub fn config(&mut self) -> &mut TcpTransportConfig {
        &mut self.config
    }

    /// Set the TCP connection configuration
    pub fn with_config(mut self, config: TcpTransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the TLS client configuration used for secure connections.
    ///
    /// Without one, the platform's root certificates are loaded on first use.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Build the transport.
    pub fn build(self) -> TcpTransport {
        TcpTransport {
            config: Arc::new(self.config),
            #[cfg(feature = "tls")]
            tls: self.tls,
        }
    }
}

impl TcpTransport {
    /// Create a new TCP transport builder with the default configuration.
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::default()
    }

    /// Get the configuration for the TCP transport.
    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    /// Replace the TCP connection configuration.
    pub fn with_config(mut self, config: TcpTransportConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Replace the TLS client configuration used for secure connections.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    async fn connect_tcp(&self, host: &str, port: u16) -> Result<(TcpStream, SocketAddr), ConnectError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(ConnectError::msg("dns resolution"))?
            .collect();
        trace!(count = addrs.len(), "resolved addresses");

        let config = &*self.config;
        let mut attempts = Staggered::new(config.happy_eyeballs_delay);
        for addr in interleave(addrs) {
            let span = tracing::trace_span!("connect", remote.addr = %addr);
            attempts.push(async move {
                let stream = connect(&addr, config).instrument(span).await?;
                Ok::<_, ConnectError>((stream, addr))
            });
        }

        attempts.finish().await.map_err(|error| match error {
            StaggerError::Failed(error) => error,
            StaggerError::Exhausted => ConnectError::new("Exhausted connection candidates"),
        })
    }

    #[cfg(feature = "tls")]
    async fn secure(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        tls_target_host: &str,
    ) -> Result<Stream, ConnectError> {
        let config = match &self.tls {
            Some(config) => config.clone(),
            None => Arc::new(super::tls::default_tls_config()?),
        };
        let stream = super::tls::handshake(stream, tls_target_host, config).await?;
        Ok(Stream::tls(stream, peer_addr))
    }

    #[cfg(not(feature = "tls"))]
    async fn secure(
        &self,
        _stream: TcpStream,
        _peer_addr: SocketAddr,
        _tls_target_host: &str,
    ) -> Result<Stream, ConnectError> {
        Err(ConnectError::new("tls support is not enabled").permanent())
    }
}

impl Transport for TcpTransport {
    type IO = Stream;

    fn connect<'a>(
        &'a self,
        config: &'a TransportConfig,
    ) -> BoxFuture<'a, Result<Self::IO, ConnectError>> {
        let span = tracing::trace_span!("tcp", host = %config.host(), port = config.port());

        Box::pin(
            async move {
                let (stream, peer_addr) = self.connect_tcp(config.host(), config.port()).await?;
                trace!(peer.addr = %peer_addr, "tcp connected");

                match config {
                    TransportConfig::Plain { .. } => Ok(Stream::tcp(stream, peer_addr)),
                    TransportConfig::Secure {
                        tls_target_host, ..
                    } => self.secure(stream, peer_addr, tls_target_host).await,
                }
            }
            .instrument(span),
        )
    }
}

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Time budget for a single connection attempt.
    pub connect_timeout: Option<Duration>,

    /// Delay before racing the next resolved address. `None` tries them one by one.
    pub happy_eyeballs_delay: Option<Duration>,

    /// The timeout for keep-alive connections.
    pub keep_alive_timeout: Option<Duration>,

    /// The local IPv4 address to bind to.
    pub local_address_ipv4: Option<Ipv4Addr>,

    /// The local IPv6 address to bind to.
    pub local_address_ipv6: Option<Ipv6Addr>,

    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,

    /// Whether to reuse the local address.
    pub reuse_address: bool,

    /// The size of the send buffer.
    pub send_buffer_size: Option<usize>,

    /// The size of the receive buffer.
    pub recv_buffer_size: Option<usize>,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            happy_eyeballs_delay: Some(Duration::from_millis(250)),
            keep_alive_timeout: Some(Duration::from_secs(90)),
            local_address_ipv4: None,
            local_address_ipv6: None,
            nodelay: true,
            reuse_address: true,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

fn bind_local_address(
    socket: &TcpSocket,
    dst_addr: &SocketAddr,
    local_addr_ipv4: &Option<Ipv4Addr>,
    local_addr_ipv6: &Option<Ipv6Addr>,
) -> io::Result<()> {
    match (*dst_addr, local_addr_ipv4, local_addr_ipv6) {
        (SocketAddr::V4(_), Some(addr), _) => {
            socket.bind(SocketAddr::new((*addr).into(), 0))?;
        }
        (SocketAddr::V6(_), _, Some(addr)) => {
            socket.bind(SocketAddr::new((*addr).into(), 0))?;
        }
        _ => {}
    }

    Ok(())
}

#[tracing::instrument(skip(config), level = "debug")]
async fn connect(addr: &SocketAddr, config: &TcpTransportConfig) -> Result<TcpStream, ConnectError> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(ConnectError::msg("tcp open error"))?;
    trace!("tcp socket opened");

    let guard = tracing::trace_span!("socket_options").entered();

    if let Some(dur) = config.keep_alive_timeout {
        let conf = socket2::TcpKeepalive::new().with_time(dur);
        if let Err(e) = socket2::SockRef::from(&socket).set_tcp_keepalive(&conf) {
            warn!("tcp set_keepalive error: {}", e);
        }
    }

    bind_local_address(
        &socket,
        addr,
        &config.local_address_ipv4,
        &config.local_address_ipv6,
    )
    .map_err(ConnectError::msg("tcp bind local address"))?;

    if config.reuse_address {
        if let Err(e) = socket.set_reuseaddr(true) {
            warn!("tcp set_reuse_address error: {}", e);
        }
    }

    if let Some(size) = config.send_buffer_size {
        if let Err(e) = socket.set_send_buffer_size(size.try_into().unwrap_or(u32::MAX)) {
            warn!("tcp set_buffer_size error: {}", e);
        }
    }

    if let Some(size) = config.recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size.try_into().unwrap_or(u32::MAX)) {
            warn!("tcp set_recv_buffer_size error: {}", e);
        }
    }

    drop(guard);

    let connecting = socket.connect(*addr);
    let stream = match config.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, connecting).await.map_err(|_| {
            ConnectError::new(format!("tcp connect timed out after {}ms", timeout.as_millis()))
        })?,
        None => connecting.await,
    }
    .map_err(ConnectError::msg("tcp connect error"))?;

    if let Err(e) = stream.set_nodelay(config.nodelay) {
        warn!("tcp set_nodelay error: {}", e);
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::transport::Abort;

    #[tokio::test]
    async fn test_tcp_transport() {
        let _ = tracing_subscriber::fmt::try_init();

        let bind = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = bind.local_addr().unwrap().port();

        let transport = TcpTransport::default();
        let config = TransportConfig::Plain {
            host: "127.0.0.1".into(),
            port,
        };

        let (stream, accepted) = tokio::join!(transport.connect(&config), async {
            bind.accept().await.unwrap().0
        });
        let mut stream = stream.unwrap();
        let mut accepted = accepted;

        assert_eq!(
            stream.peer_addr(),
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
        );
        assert!(!stream.is_tls());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tcp_localhost_finds_listener() {
        let bind = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = bind.local_addr().unwrap().port();

        let transport = TcpTransport::builder()
            .with_config(TcpTransportConfig {
                happy_eyeballs_delay: Some(Duration::from_millis(20)),
                ..Default::default()
            })
            .build();
        let config = TransportConfig::Plain {
            host: "localhost".into(),
            port,
        };

        let (stream, _accepted) = tokio::join!(transport.connect(&config), async {
            bind.accept().await.unwrap().0
        });
        let stream = stream.unwrap();
        assert_eq!(
            stream.peer_addr(),
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
        );
    }

    #[tokio::test]
    async fn test_tcp_refused() {
        let _ = tracing_subscriber::fmt::try_init();

        // Bind then drop to find a port with nothing listening.
        let port = {
            let bind = TcpListener::bind("127.0.0.1:0").await.unwrap();
            bind.local_addr().unwrap().port()
        };

        let transport = TcpTransport::default();
        let config = TransportConfig::Plain {
            host: "127.0.0.1".into(),
            port,
        };

        let error = transport.connect(&config).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let bind = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = bind.local_addr().unwrap().port();

        let transport = TcpTransport::default();
        let config = TransportConfig::Plain {
            host: "127.0.0.1".into(),
            port,
        };

        let (stream, _accepted) = tokio::join!(transport.connect(&config), async {
            bind.accept().await.unwrap().0
        });
        let mut stream = stream.unwrap();

        stream.abort().unwrap();
        assert!(stream.is_aborted());
        stream.abort().unwrap();

        let err = stream.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
