//! Protocol negotiation.
//!
//! Before any frames flow, client and peer agree, layer by layer, on which protocol
//! applies and at which version. The [`NegotiationPipeline`] lists those layers in the
//! order they are offered: SASL authentication first (when credentials exist), then
//! AMQP itself, which is always last.
//!
//! The pipeline is configuration only. The header exchange on the wire happens in the
//! [`handshake`](crate::handshake) stage.

use std::sync::Arc;

use crate::address::Credential;
use crate::sasl::{SaslHandler, SaslPlainHandler};

mod header;
mod provider;
mod version;

pub use self::header::{InvalidHeader, ProtocolHeader, ProtocolId, HEADER_LEN};
pub use self::provider::{ProtocolProvider, VersionHandler};
pub use self::version::{InvalidVersion, ProtocolVersion};

/// Ordered protocol providers, tried against peer offers in insertion order.
#[derive(Debug, Clone)]
pub struct NegotiationPipeline {
    providers: Vec<ProtocolProvider>,
}

impl NegotiationPipeline {
    /// Build the pipeline for an optional inline credential.
    ///
    /// A credential becomes a SASL PLAIN handler.
    pub fn build(credential: Option<&Credential>) -> Self {
        Self::with_handler(credential.map(SaslPlainHandler::shared))
    }

    /// Build the pipeline around an externally-constructed authentication handler.
    pub fn with_handler(handler: Option<Arc<dyn SaslHandler>>) -> Self {
        let mut providers = Vec::with_capacity(2);
        if let Some(handler) = handler {
            tracing::trace!(mechanism = handler.mechanism(), "sasl provider configured");
            providers.push(ProtocolProvider::sasl(handler));
        }
        providers.push(ProtocolProvider::amqp());
        Self { providers }
    }

    /// Providers in negotiation order. The AMQP provider is always last.
    pub fn providers(&self) -> &[ProtocolProvider] {
        &self.providers
    }

    /// Iterate over providers in negotiation order.
    pub fn iter(&self) -> std::slice::Iter<'_, ProtocolProvider> {
        self.providers.iter()
    }

    /// Number of providers: one, or two when authenticating.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Always false: the AMQP provider is always present.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The authentication handler, if the pipeline authenticates.
    pub fn authentication(&self) -> Option<&Arc<dyn SaslHandler>> {
        self.providers.iter().find_map(|provider| match provider.handler() {
            VersionHandler::Sasl(handler) => Some(handler),
            VersionHandler::Amqp => None,
        })
    }

    /// Find the first provider matching a peer's header.
    pub fn select(&self, offered: &ProtocolHeader) -> Option<(&ProtocolProvider, &VersionHandler)> {
        self.providers
            .iter()
            .find_map(|provider| provider.select(offered).map(|handler| (provider, handler)))
    }
}

impl<'a> IntoIterator for &'a NegotiationPipeline {
    type Item = &'a ProtocolProvider;
    type IntoIter = std::slice::Iter<'a, ProtocolProvider>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_adds_sasl_first() {
        let credential = Credential::new("alice", "secret");
        let pipeline = NegotiationPipeline::build(Some(&credential));

        let ids: Vec<_> = pipeline.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![ProtocolId::Sasl, ProtocolId::Amqp]);

        let handler = pipeline.authentication().unwrap();
        assert_eq!(handler.identity(), "alice");
        assert_eq!(handler.secret(), "secret");
    }

    #[test]
    fn no_credential_is_amqp_only() {
        let pipeline = NegotiationPipeline::build(None);
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.providers()[0].id(), ProtocolId::Amqp);
        assert!(pipeline.authentication().is_none());
        assert!(!pipeline.is_empty());
    }

    #[test]
    fn select_first_match_in_order() {
        let credential = Credential::new("alice", "");
        let pipeline = NegotiationPipeline::build(Some(&credential));

        let sasl = ProtocolHeader::new(ProtocolId::Sasl, ProtocolVersion::V1_0_0);
        let (provider, handler) = pipeline.select(&sasl).unwrap();
        assert_eq!(provider.id(), ProtocolId::Sasl);
        assert!(matches!(handler, VersionHandler::Sasl(_)));

        let amqp = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0);
        assert_eq!(pipeline.select(&amqp).unwrap().0.id(), ProtocolId::Amqp);

        let tls = ProtocolHeader::new(ProtocolId::Tls, ProtocolVersion::V1_0_0);
        assert!(pipeline.select(&tls).is_none());
    }
}
