use std::fmt;
use std::sync::Arc;

use super::{ProtocolHeader, ProtocolId, ProtocolVersion};
use crate::sasl::SaslHandler;

/// The handler a provider hands control to once its version is matched.
#[derive(Clone)]
pub enum VersionHandler {
    /// SASL authentication exchange.
    Sasl(Arc<dyn SaslHandler>),

    /// AMQP framing, ending in the open exchange.
    Amqp,
}

impl fmt::Debug for VersionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionHandler::Sasl(handler) => f.debug_tuple("Sasl").field(handler).finish(),
            VersionHandler::Amqp => f.write_str("Amqp"),
        }
    }
}

/// A negotiable protocol layer.
///
/// A provider advertises the versions it supports, and matches a header offered by
/// the peer when both the protocol id and version line up.
#[derive(Debug, Clone)]
pub struct ProtocolProvider {
    id: ProtocolId,
    versions: Vec<ProtocolVersion>,
    handler: VersionHandler,
}

impl ProtocolProvider {
    /// The SASL provider ("AMQP3100"), owning an authentication handler.
    pub fn sasl(handler: Arc<dyn SaslHandler>) -> Self {
        Self {
            id: ProtocolId::Sasl,
            versions: vec![ProtocolVersion::new(1, 0, 0)],
            handler: VersionHandler::Sasl(handler),
        }
    }

    /// The AMQP provider ("AMQP0100").
    pub fn amqp() -> Self {
        Self {
            id: ProtocolId::Amqp,
            versions: vec![ProtocolVersion::from((1, 0, 0, 0))],
            handler: VersionHandler::Amqp,
        }
    }

    /// Advertise an additional version, after the ones already advertised.
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        if !self.versions.contains(&version) {
            self.versions.push(version);
        }
        self
    }

    /// The protocol layer this provider negotiates.
    pub fn id(&self) -> ProtocolId {
        self.id
    }

    /// Advertised versions, most preferred first.
    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    /// The handler for this layer.
    pub fn handler(&self) -> &VersionHandler {
        &self.handler
    }

    /// The header this provider offers to the peer: its preferred version.
    pub fn header(&self) -> ProtocolHeader {
        // Constructors always advertise at least one version.
        ProtocolHeader::new(self.id, self.versions[0])
    }

    /// Match a header offered by the peer, yielding the handler on success.
    pub fn select(&self, offered: &ProtocolHeader) -> Option<&VersionHandler> {
        (offered.id() == self.id && self.versions.contains(&offered.version()))
            .then_some(&self.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::SaslPlainHandler;

    #[test]
    fn amqp_matches_its_own_header() {
        let provider = ProtocolProvider::amqp();
        let offered = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0);
        assert!(matches!(provider.select(&offered), Some(VersionHandler::Amqp)));
        assert_eq!(provider.header(), offered);
    }

    #[test]
    fn mismatched_id_or_version() {
        let provider = ProtocolProvider::sasl(Arc::new(SaslPlainHandler::new("a", "b")));
        let wrong_id = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0);
        let wrong_version = ProtocolHeader::new(ProtocolId::Sasl, ProtocolVersion::new(0, 9, 1));
        assert!(provider.select(&wrong_id).is_none());
        assert!(provider.select(&wrong_version).is_none());
    }

    #[test]
    fn additional_versions_are_matched_but_not_preferred() {
        let provider = ProtocolProvider::amqp().with_version(ProtocolVersion::new(1, 1, 0));
        let offered = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::new(1, 1, 0));
        assert!(provider.select(&offered).is_some());
        assert_eq!(provider.header().version(), ProtocolVersion::V1_0_0);
    }
}
