//! Transports carry protocol frames between this client and a broker.
//!
//! The [`TransportConfig`] describes *where* to connect and whether TLS is layered
//! on top. A [`Transport`] turns that configuration into a connected byte stream.
//!
//! Two transports are provided:
//! - [`TcpTransport`]: connects over TCP/IP, with TLS for secure configurations.
//! - [`DuplexTransport`]: connects to an in-process peer over an in-memory stream.
//!
//! Every transport stream implements [`Abort`], which the bootstrap uses to tear the
//! stream down on failure paths.

use std::fmt;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::address::{Address, Scheme};
use crate::BoxFuture;

pub mod duplex;
mod happy_eyeballs;
mod stream;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

pub use self::duplex::{DuplexIncoming, DuplexStream, DuplexTransport};
pub use self::stream::Stream;
pub use self::tcp::{TcpTransport, TcpTransportConfig};

/// The standard port for unencrypted AMQP.
pub const DEFAULT_PORT: u16 = 5672;

/// The standard port for AMQP over TLS.
pub const DEFAULT_SECURE_PORT: u16 = 5671;

/// Ports used when an address doesn't carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPorts {
    /// Port for `amqp` addresses.
    pub plain: u16,

    /// Port for `amqps` addresses.
    pub secure: u16,
}

impl Default for DefaultPorts {
    fn default() -> Self {
        Self {
            plain: DEFAULT_PORT,
            secure: DEFAULT_SECURE_PORT,
        }
    }
}

/// Concrete transport configuration selected from an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Unencrypted TCP.
    Plain {
        /// Remote host name or IP literal.
        host: String,

        /// Remote port.
        port: u16,
    },

    /// TLS over TCP.
    Secure {
        /// Remote host name or IP literal.
        host: String,

        /// Remote port.
        port: u16,

        /// Server name used for SNI and certificate verification.
        tls_target_host: String,
    },
}

impl TransportConfig {
    /// Select the transport for an address using the standard default ports.
    pub fn select(address: &Address) -> Self {
        Self::select_with_ports(address, &DefaultPorts::default())
    }

    /// Select the transport for an address, falling back to `ports` when the address
    /// has no port of its own.
    pub fn select_with_ports(address: &Address, ports: &DefaultPorts) -> Self {
        let host = address.host().to_owned();
        match address.scheme() {
            Scheme::Plain => TransportConfig::Plain {
                port: address.port().unwrap_or(ports.plain),
                host,
            },
            Scheme::Secure => TransportConfig::Secure {
                port: address.port().unwrap_or(ports.secure),
                tls_target_host: host.clone(),
                host,
            },
        }
    }

    /// The remote host.
    pub fn host(&self) -> &str {
        match self {
            TransportConfig::Plain { host, .. } | TransportConfig::Secure { host, .. } => host,
        }
    }

    /// The remote port.
    pub fn port(&self) -> u16 {
        match self {
            TransportConfig::Plain { port, .. } | TransportConfig::Secure { port, .. } => *port,
        }
    }

    /// The TLS server name, for secure configurations.
    pub fn tls_target_host(&self) -> Option<&str> {
        match self {
            TransportConfig::Plain { .. } => None,
            TransportConfig::Secure {
                tls_target_host, ..
            } => Some(tls_target_host),
        }
    }

    /// Does this configuration layer TLS over the connection?
    pub fn is_secure(&self) -> bool {
        matches!(self, TransportConfig::Secure { .. })
    }
}

/// Hard, non-graceful teardown of a transport stream.
pub trait Abort {
    /// Release the stream's resources immediately.
    ///
    /// Calling this more than once is a no-op. After an abort, reads and writes fail
    /// with [`io::ErrorKind::NotConnected`].
    fn abort(&mut self) -> io::Result<()>;

    /// Has this stream been aborted?
    fn is_aborted(&self) -> bool;
}

/// A transport connects to a remote peer described by a [`TransportConfig`].
///
/// The returned stream is exclusively owned by the caller.
pub trait Transport: Send + Sync {
    /// The connected stream type.
    type IO: AsyncRead + AsyncWrite + Abort + Send + Unpin + 'static;

    /// Connect to the peer, including any TLS handshake the configuration asks for.
    ///
    /// Dropping the returned future releases any partially-opened socket.
    fn connect<'a>(&'a self, config: &'a TransportConfig)
        -> BoxFuture<'a, Result<Self::IO, ConnectError>>;
}

/// Error returned when a transport fails to connect.
#[derive(Debug, Error)]
pub struct ConnectError {
    message: String,
    retryable: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectError {
    /// Create an error with only a message.
    pub fn new<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            retryable: true,
            source: None,
        }
    }

    /// Adapter for `map_err` which wraps the underlying cause with a message.
    pub fn msg<S, E>(message: S) -> impl FnOnce(E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        move |error| Self::build(message, error)
    }

    /// Create an error with a message and an underlying cause.
    pub fn build<S, E>(message: S, error: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            retryable: true,
            source: Some(Box::new(error)),
        }
    }

    /// Mark this error as one that retrying won't fix, e.g. a rejected certificate.
    pub fn permanent(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Whether retrying the connection can succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref source) = self.source {
            write!(f, "{}: {}", self.message, source)
        } else {
            write!(f, "{}", self.message)
        }
    }
}
