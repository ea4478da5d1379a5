use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::address::AddressError;
use crate::transport::ConnectError;
use crate::BoxError;

/// The bootstrap stage which exceeded its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Transport connect, including the TLS handshake.
    Connect,

    /// The open handshake over an established transport.
    Open,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => f.write_str("transport connect"),
            Stage::Open => f.write_str("open handshake"),
        }
    }
}

/// Error returned when a connection can't be opened.
///
/// No connection handle exists on any of these paths, and a transport acquired
/// before the failure has already been aborted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The address is not a valid URI, or its credential can't be split.
    #[error("malformed address: {0}")]
    MalformedAddress(#[source] AddressError),

    /// The address scheme is not `amqp` or `amqps`.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// A stage didn't finish within its budget.
    #[error("{stage} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Which stage ran out of time.
        stage: Stage,

        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The transport (or its TLS layer) failed to connect.
    #[error("connect: {0}")]
    Connect(#[source] ConnectError),

    /// The open handshake failed.
    #[error("open: {0}")]
    Open(#[source] BoxError),
}

impl Error {
    pub(crate) fn timeout(stage: Stage, timeout: Duration) -> Self {
        Error::Timeout { stage, timeout }
    }

    /// Whether retrying the same request (with backoff) can succeed.
    ///
    /// Address and open-handshake failures need a change of configuration first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Connect(error) => error.is_retryable(),
            _ => false,
        }
    }
}

impl From<AddressError> for Error {
    fn from(error: AddressError) -> Self {
        match error {
            AddressError::UnsupportedScheme(scheme) => Error::UnsupportedScheme(scheme),
            error => Error::MalformedAddress(error),
        }
    }
}

impl From<ConnectError> for Error {
    fn from(error: ConnectError) -> Self {
        Error::Connect(error)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Send, Sync, Into<BoxError>);

    #[test]
    fn unsupported_scheme_is_lifted() {
        let error: Error = AddressError::UnsupportedScheme("http".into()).into();
        assert!(matches!(error, Error::UnsupportedScheme(ref s) if s == "http"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        let error = Error::timeout(Stage::Open, Duration::from_millis(250));
        assert!(error.is_retryable());
        assert_eq!(error.to_string(), "open handshake timed out after 250ms");
    }
}
