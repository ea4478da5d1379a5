//! SASL authentication handlers.
//!
//! A handler carries the credentials and the mechanism-specific logic for the
//! challenge/response exchange. Driving the SASL frames on the wire is the job of the
//! [`Handshake`](crate::handshake::Handshake) implementation.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::address::Credential;

/// Error returned when a handler can't answer a challenge.
#[derive(Debug, Error)]
#[error("{mechanism}: {message}")]
pub struct SaslError {
    mechanism: &'static str,
    message: String,
}

impl SaslError {
    /// Create an error for a mechanism.
    pub fn new(mechanism: &'static str, message: impl Into<String>) -> Self {
        Self {
            mechanism,
            message: message.into(),
        }
    }
}

/// An authentication handler for one SASL mechanism.
pub trait SaslHandler: fmt::Debug + Send + Sync {
    /// The mechanism name, as offered by the peer (e.g. `PLAIN`).
    fn mechanism(&self) -> &'static str;

    /// The identity being authenticated.
    fn identity(&self) -> &str;

    /// The secret proving the identity.
    fn secret(&self) -> &str;

    /// Initial response sent with the mechanism selection.
    fn initial_response(&self) -> Vec<u8>;

    /// Respond to a server challenge.
    fn on_challenge(&self, challenge: &[u8]) -> Result<Vec<u8>, SaslError>;
}

/// The `PLAIN` mechanism (RFC 4616).
#[derive(Clone)]
pub struct SaslPlainHandler {
    identity: String,
    secret: String,
}

impl SaslPlainHandler {
    /// Mechanism name.
    pub const MECHANISM: &'static str = "PLAIN";

    /// Create a handler for an identity and secret.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// A shared handler for an inline credential, ready for a [`NegotiationPipeline`].
    ///
    /// [`NegotiationPipeline`]: crate::negotiation::NegotiationPipeline
    pub fn shared(credential: &Credential) -> Arc<dyn SaslHandler> {
        Arc::new(Self::from(credential))
    }
}

impl From<&Credential> for SaslPlainHandler {
    fn from(credential: &Credential) -> Self {
        Self::new(credential.identity(), credential.secret())
    }
}

impl fmt::Debug for SaslPlainHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslPlainHandler")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl SaslHandler for SaslPlainHandler {
    fn mechanism(&self) -> &'static str {
        Self::MECHANISM
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn secret(&self) -> &str {
        &self.secret
    }

    fn initial_response(&self) -> Vec<u8> {
        // authzid is left empty: [authzid] NUL authcid NUL passwd
        let mut response = Vec::with_capacity(self.identity.len() + self.secret.len() + 2);
        response.push(0);
        response.extend_from_slice(self.identity.as_bytes());
        response.push(0);
        response.extend_from_slice(self.secret.as_bytes());
        response
    }

    fn on_challenge(&self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        Err(SaslError::new(Self::MECHANISM, "mechanism has no challenges"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_initial_response() {
        let handler = SaslPlainHandler::new("alice", "secret");
        assert_eq!(handler.initial_response(), b"\0alice\0secret");
        assert_eq!(handler.mechanism(), "PLAIN");
    }

    #[test]
    fn plain_rejects_challenge() {
        let handler = SaslPlainHandler::new("alice", "");
        assert!(handler.on_challenge(b"anything").is_err());
    }

    #[test]
    fn from_credential() {
        let credential = Credential::new("bob", "pw");
        let handler = SaslPlainHandler::from(&credential);
        assert_eq!(handler.identity(), "bob");
        assert_eq!(handler.secret(), "pw");
        assert!(!format!("{handler:?}").contains("pw"));
    }

    #[test]
    fn shared_from_credential() {
        let handler = SaslPlainHandler::shared(&Credential::new("carol", "pw"));
        assert_eq!(handler.mechanism(), SaslPlainHandler::MECHANISM);
        assert_eq!(handler.initial_response(), b"\0carol\0pw");
    }
}
