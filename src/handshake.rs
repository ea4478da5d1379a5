//! The open handshake.
//!
//! The handshake turns a connected transport into an open connection. It walks the
//! [`NegotiationPipeline`] in order, agreeing on each protocol layer with the peer, and
//! finishes with the AMQP open exchange.
//!
//! [`Handshake`] is the seam: frame-level SASL and open exchanges plug in here.
//! [`HeaderHandshake`] provides the protocol header exchange for each layer.

use std::fmt;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::trace;

use crate::connection::ConnectionSettings;
use crate::negotiation::{
    InvalidHeader, NegotiationPipeline, ProtocolHeader, ProtocolId, ProtocolProvider,
    ProtocolVersion, HEADER_LEN,
};
use crate::{BoxError, BoxFuture};

/// Error returned when the open handshake fails.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpenError {
    /// Reading from or writing to the transport failed.
    #[error("transport i/o")]
    Io(#[from] io::Error),

    /// The peer answered with something that isn't a protocol header.
    #[error("invalid protocol header from peer")]
    InvalidHeader(#[from] InvalidHeader),

    /// The peer doesn't support the layer or version this client requested.
    #[error("protocol mismatch: requested {requested}, peer offered {offered}")]
    Mismatch {
        /// The header this client sent.
        requested: ProtocolHeader,

        /// The header the peer answered with.
        offered: ProtocolHeader,
    },

    /// The peer refused the connection.
    #[error("rejected by peer: {0}")]
    Rejected(String),
}

/// The outcome of a successful handshake: one agreed header per negotiated layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiated {
    layers: Vec<ProtocolHeader>,
}

impl Negotiated {
    /// Record an agreed layer.
    pub fn push(&mut self, header: ProtocolHeader) {
        self.layers.push(header);
    }

    /// Agreed layers, in negotiation order.
    pub fn layers(&self) -> &[ProtocolHeader] {
        &self.layers
    }

    /// The agreed version of a layer.
    pub fn version(&self, id: ProtocolId) -> Option<ProtocolVersion> {
        self.layers
            .iter()
            .find(|header| header.id() == id)
            .map(ProtocolHeader::version)
    }

    /// Was a layer agreed with the peer?
    pub fn has_layer(&self, id: ProtocolId) -> bool {
        self.version(id).is_some()
    }

    /// Was the SASL layer agreed?
    ///
    /// This only records the header exchange. Whether the peer accepted the
    /// credentials is up to the [`Handshake`] that ran the SASL frames.
    pub fn sasl_negotiated(&self) -> bool {
        self.has_layer(ProtocolId::Sasl)
    }
}

/// Drives the open handshake over a connected transport.
///
/// Implementations must not retain the stream: the bootstrap owns it, and aborts it if
/// the returned future fails or is dropped.
pub trait Handshake<IO>: Send + Sync {
    /// Run the handshake for `pipeline`, opening with `settings`.
    fn open<'a>(
        &'a self,
        stream: &'a mut IO,
        pipeline: &'a NegotiationPipeline,
        settings: &'a ConnectionSettings,
    ) -> BoxFuture<'a, Result<Negotiated, BoxError>>;
}

/// Exchange one protocol header with the peer.
///
/// Sends the provider's preferred header, reads the peer's reply and checks the
/// provider accepts it.
pub async fn exchange_header<IO>(
    stream: &mut IO,
    provider: &ProtocolProvider,
) -> Result<ProtocolHeader, OpenError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let requested = provider.header();
    stream.write_all(&requested.to_bytes()).await?;
    stream.flush().await?;
    trace!(header = %requested, "sent protocol header");

    let mut buf = [0u8; HEADER_LEN];
    stream.read_exact(&mut buf).await?;
    let offered = ProtocolHeader::from_bytes(&buf)?;
    trace!(header = %offered, "received protocol header");

    match provider.select(&offered) {
        Some(_) => Ok(offered),
        None => Err(OpenError::Mismatch { requested, offered }),
    }
}

/// Negotiates every layer of the pipeline with a protocol header exchange.
///
/// Layers are negotiated strictly in pipeline order, so authentication is agreed
/// before AMQP. No SASL or open frames are sent: this is enough for peers that echo
/// headers (in-process peers, tests), while brokers need a frame-level [`Handshake`].
#[derive(Clone, Default)]
pub struct HeaderHandshake {
    _priv: (),
}

impl HeaderHandshake {
    /// Create a new header handshake.
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

impl fmt::Debug for HeaderHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderHandshake").finish()
    }
}

impl<IO> Handshake<IO> for HeaderHandshake
where
    IO: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn open<'a>(
        &'a self,
        stream: &'a mut IO,
        pipeline: &'a NegotiationPipeline,
        settings: &'a ConnectionSettings,
    ) -> BoxFuture<'a, Result<Negotiated, BoxError>> {
        Box::pin(async move {
            let mut negotiated = Negotiated::default();
            for provider in pipeline {
                let agreed = exchange_header(stream, provider).await?;
                negotiated.push(agreed);
            }
            tracing::debug!(
                container_id = %settings.container_id,
                layers = negotiated.layers().len(),
                "protocol negotiation complete"
            );
            Ok(negotiated)
        })
    }
}
