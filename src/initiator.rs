//! Transport initiation, bounded by a timeout.

use std::time::Duration;

use tracing::Instrument as _;

use crate::error::{Error, Stage};
use crate::transport::{Transport, TransportConfig};

/// Connects a [`Transport`] within a time budget.
///
/// The budget covers the whole connect, TLS handshake included. When it runs out the
/// connect future is dropped, which releases any half-open socket.
#[derive(Debug, Clone, Default)]
pub struct TransportInitiator<T> {
    transport: T,
}

impl<T> TransportInitiator<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T> TransportInitiator<T>
where
    T: Transport,
{
    /// Connect to the peer described by `config`.
    pub async fn connect(&self, config: &TransportConfig, timeout: Duration) -> Result<T::IO, Error> {
        let span = tracing::debug_span!("transport", secure = config.is_secure());
        match tokio::time::timeout(timeout, self.transport.connect(config))
            .instrument(span)
            .await
        {
            Ok(Ok(stream)) => {
                tracing::debug!(host = %config.host(), port = config.port(), "transport connected");
                Ok(stream)
            }
            Ok(Err(error)) => {
                tracing::debug!("transport connect failed: {error}");
                Err(Error::Connect(error))
            }
            Err(_) => {
                tracing::debug!(timeout = ?timeout, "transport connect timed out");
                Err(Error::timeout(Stage::Connect, timeout))
            }
        }
    }
}
