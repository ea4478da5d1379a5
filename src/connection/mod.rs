//! Opened connections.
//!
//! A [`Connection`] only exists once a transport is connected *and* the open handshake
//! has succeeded. It exclusively owns its transport stream until it is closed or
//! aborted.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt as _};

use crate::handshake::Negotiated;
use crate::negotiation::NegotiationPipeline;
use crate::transport::Abort;

pub(crate) mod guard;
mod id;

pub use self::id::{IdGenerator, RandomIds};

/// Default maximum frame size, 64 KiB.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Default highest channel number.
pub const DEFAULT_CHANNEL_MAX: u16 = 8 * 1024 - 1;

/// Lifecycle of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Resolving the address and connecting the transport.
    Initiating,

    /// The transport is connected, the open handshake hasn't started.
    TransportConnected,

    /// The open handshake is running.
    Opening,

    /// The connection is open.
    Open,

    /// The transport was torn down after a failure, or by [`Connection::abort`].
    Aborted,

    /// The connection was closed gracefully.
    Closed,
}

impl ConnectionState {
    /// Is this a state a connection never leaves?
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Aborted | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initiating => "initiating",
            ConnectionState::TransportConnected => "transport-connected",
            ConnectionState::Opening => "opening",
            ConnectionState::Open => "open",
            ConnectionState::Aborted => "aborted",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Limits offered to the peer in the open exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest frame this client accepts.
    pub max_frame_size: u32,

    /// Highest channel number this client uses.
    pub channel_max: u16,

    /// Idle timeout requested from the peer, if any.
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_max: DEFAULT_CHANNEL_MAX,
            idle_timeout: None,
        }
    }
}

/// Settings a connection opens with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Unique identifier of this container.
    pub container_id: String,

    /// Host name claimed in the open exchange.
    pub host_name: String,

    /// Largest frame this client accepts.
    pub max_frame_size: u32,

    /// Highest channel number this client uses.
    pub channel_max: u16,

    /// Idle timeout requested from the peer, if any.
    pub idle_timeout: Option<Duration>,
}

impl ConnectionSettings {
    /// Settings for a container and host, with the given limits.
    pub fn new(
        container_id: impl Into<String>,
        host_name: impl Into<String>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            host_name: host_name.into(),
            max_frame_size: config.max_frame_size,
            channel_max: config.channel_max,
            idle_timeout: config.idle_timeout,
        }
    }
}

/// An opened connection.
pub struct Connection<IO> {
    stream: IO,
    settings: ConnectionSettings,
    pipeline: NegotiationPipeline,
    negotiated: Negotiated,
    state: ConnectionState,
}

impl<IO> fmt::Debug for Connection<IO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("container_id", &self.settings.container_id)
            .field("host_name", &self.settings.host_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<IO> Connection<IO> {
    pub(crate) fn open(
        stream: IO,
        settings: ConnectionSettings,
        pipeline: NegotiationPipeline,
        negotiated: Negotiated,
    ) -> Self {
        Self {
            stream,
            settings,
            pipeline,
            negotiated,
            state: ConnectionState::Open,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Is the connection open?
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Settings the connection opened with.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// This connection's container identifier.
    pub fn container_id(&self) -> &str {
        &self.settings.container_id
    }

    /// The host name claimed in the open exchange.
    pub fn host_name(&self) -> &str {
        &self.settings.host_name
    }

    /// What was agreed with the peer, layer by layer.
    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    /// The pipeline the connection negotiated with.
    pub fn pipeline(&self) -> &NegotiationPipeline {
        &self.pipeline
    }

    /// The underlying transport stream, for the session layer.
    pub fn stream_mut(&mut self) -> &mut IO {
        &mut self.stream
    }
}

impl<IO> Connection<IO>
where
    IO: Abort,
{
    /// Tear the transport down immediately.
    ///
    /// Best-effort: a failing abort is logged and the connection is still `Aborted`.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Err(error) = self.stream.abort() {
            tracing::warn!(container_id = %self.settings.container_id, "abort failed: {error}");
        }
        self.state = ConnectionState::Aborted;
    }
}

impl<IO> Connection<IO>
where
    IO: AsyncWrite + Abort + Unpin,
{
    /// Shut the transport down gracefully.
    ///
    /// On failure the transport is aborted and the error returned. Closing an already
    /// closed or aborted connection does nothing.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        match self.stream.shutdown().await {
            Ok(()) => {
                tracing::debug!(container_id = %self.settings.container_id, "connection closed");
                self.state = ConnectionState::Closed;
                Ok(())
            }
            Err(error) => {
                self.abort();
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt as _;

    use super::*;
    use crate::transport::{duplex, Transport as _, TransportConfig};

    async fn opened() -> (Connection<duplex::DuplexStream>, tokio::io::DuplexStream) {
        let (transport, mut incoming) = duplex::pair(64);
        let config = TransportConfig::Plain {
            host: "peer".into(),
            port: 5672,
        };
        let (stream, server) = tokio::join!(transport.connect(&config), incoming.accept());
        let settings = ConnectionSettings::new("c-1", "peer", &ConnectionConfig::default());
        let connection = Connection::open(
            stream.unwrap(),
            settings,
            NegotiationPipeline::build(None),
            Negotiated::default(),
        );
        (connection, server.unwrap())
    }

    #[tokio::test]
    async fn close_is_graceful() {
        let (mut connection, mut server) = opened().await;
        assert!(connection.is_open());
        assert_eq!(connection.container_id(), "c-1");

        connection.close().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Closed);

        let mut buf = Vec::new();
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);

        connection.abort();
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn abort_is_terminal() {
        let (mut connection, _server) = opened().await;
        connection.abort();
        assert_eq!(connection.state(), ConnectionState::Aborted);
        assert!(connection.stream_mut().is_aborted());
        connection.close().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Aborted);
    }

    #[test]
    fn default_limits() {
        let settings = ConnectionSettings::new("id", "host", &ConnectionConfig::default());
        assert_eq!(settings.max_frame_size, 65536);
        assert_eq!(settings.channel_max, 8191);
        assert_eq!(settings.idle_timeout, None);
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
    }
}
