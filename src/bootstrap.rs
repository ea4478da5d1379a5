//! Connection bootstrap: open handshake over an established transport.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument as _;

use crate::connection::guard::AbortOnFailure;
use crate::connection::{
    Connection, ConnectionConfig, ConnectionSettings, ConnectionState, IdGenerator, RandomIds,
};
use crate::error::{Error, Stage};
use crate::handshake::{Handshake, HeaderHandshake};
use crate::negotiation::NegotiationPipeline;
use crate::transport::Abort;

/// Wraps an established transport in a [`Connection`] and opens it.
///
/// If the open handshake fails, times out, or the bootstrap future is dropped, the
/// transport is aborted before control returns to the caller.
#[derive(Clone)]
pub struct Bootstrapper<H = HeaderHandshake> {
    handshake: H,
    ids: Arc<dyn IdGenerator>,
    config: ConnectionConfig,
}

impl<H: fmt::Debug> fmt::Debug for Bootstrapper<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("handshake", &self.handshake)
            .field("ids", &self.ids)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Self::new(HeaderHandshake::new())
    }
}

impl<H> Bootstrapper<H> {
    /// Create a bootstrapper around a handshake, with random container ids.
    pub fn new(handshake: H) -> Self {
        Self {
            handshake,
            ids: Arc::new(RandomIds::new()),
            config: ConnectionConfig::default(),
        }
    }

    /// Use a different container id generator.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Use different connection limits.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// The handshake used to open connections.
    pub fn handshake(&self) -> &H {
        &self.handshake
    }

    /// Connection limits offered in the open exchange.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a connection over `stream`.
    ///
    /// `timeout` bounds the open handshake on its own; time spent connecting the
    /// transport isn't deducted from it.
    pub async fn bootstrap<IO>(
        &self,
        stream: IO,
        pipeline: NegotiationPipeline,
        host_name: &str,
        timeout: Duration,
    ) -> Result<Connection<IO>, Error>
    where
        IO: Abort + Send,
        H: Handshake<IO>,
    {
        let mut guard = AbortOnFailure::new(stream);

        let settings = ConnectionSettings::new(self.ids.next_id(), host_name, &self.config);
        let span = tracing::debug_span!("open", container_id = %settings.container_id);
        tracing::debug!(parent: &span, state = %ConnectionState::Opening, "opening connection");

        let result = {
            let Some(stream) = guard.stream_mut() else {
                return Err(released());
            };
            tokio::time::timeout(timeout, self.handshake.open(stream, &pipeline, &settings))
                .instrument(span.clone())
                .await
        };

        let error = match result {
            Ok(Ok(negotiated)) => {
                return match guard.disarm() {
                    Some(stream) => {
                        tracing::debug!(parent: &span, state = %ConnectionState::Open, "connection open");
                        Ok(Connection::open(stream, settings, pipeline, negotiated))
                    }
                    None => Err(released()),
                };
            }
            Ok(Err(error)) => Error::Open(error),
            Err(_) => Error::timeout(Stage::Open, timeout),
        };

        guard.abort();
        tracing::debug!(parent: &span, state = %ConnectionState::Aborted, "open failed: {error}");
        Err(error)
    }
}

fn released() -> Error {
    Error::Open("transport released before open".into())
}
