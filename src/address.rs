//! Connection addresses.
//!
//! An address is a URI of the form `scheme://[identity[:secret]@]host[:port]`, where
//! the scheme is either `amqp` (plain TCP) or `amqps` (TLS). Inline credentials are
//! percent-decoded and become a SASL PLAIN handler during negotiation.

use std::fmt;
use std::str::FromStr;

use http::Uri;
use thiserror::Error;

/// Scheme token for plain TCP connections.
pub const SCHEME_AMQP: &str = "amqp";

/// Scheme token for TLS connections.
pub const SCHEME_AMQPS: &str = "amqps";

/// Error returned when an address can't be resolved.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AddressError {
    /// The address is not a valid URI.
    #[error("invalid uri")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The address has no scheme.
    #[error("missing scheme")]
    MissingScheme,

    /// The address has no host.
    #[error("missing host")]
    MissingHost,

    /// The scheme is not one of `amqp` or `amqps`.
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    /// The port is not a number in `0..=65535`.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// The user-info contains more than one `:`.
    #[error("malformed credential: expected at most one ':' in user info")]
    MalformedCredential,

    /// A credential part contains an invalid percent-encoded sequence.
    #[error("invalid percent-encoding in user info")]
    InvalidEncoding,
}

/// The security scheme of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `amqp`: unencrypted TCP.
    Plain,

    /// `amqps`: TLS over TCP.
    Secure,
}

impl Scheme {
    /// The scheme token as it appears in an address.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Plain => SCHEME_AMQP,
            Scheme::Secure => SCHEME_AMQPS,
        }
    }

    /// Does this scheme require TLS?
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Secure)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(SCHEME_AMQP) {
            Ok(Scheme::Plain)
        } else if s.eq_ignore_ascii_case(SCHEME_AMQPS) {
            Ok(Scheme::Secure)
        } else {
            Err(AddressError::UnsupportedScheme(s.to_owned()))
        }
    }
}

/// Identity and secret embedded in an address.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identity: String,
    secret: String,
}

impl Credential {
    /// Create a credential from already-decoded parts.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// Parse the user-info portion of an address.
    ///
    /// The text is split on `:` into at most two parts, each percent-decoded on its
    /// own. A missing secret is the empty string.
    pub fn from_user_info(user_info: &str) -> Result<Self, AddressError> {
        let mut parts = user_info.split(':');
        let identity = parts.next().unwrap_or_default();
        let secret = parts.next();
        if parts.next().is_some() {
            return Err(AddressError::MalformedCredential);
        }

        Ok(Self {
            identity: percent_decode(identity)?,
            secret: secret.map(percent_decode).transpose()?.unwrap_or_default(),
        })
    }

    /// The authentication identity (user name).
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The secret (password).
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A resolved connection address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    credential: Option<Credential>,
}

impl Address {
    /// Create an address from its parts.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            credential: None,
        }
    }

    /// Attach a credential to this address.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Parse an address string.
    pub fn resolve(address: &str) -> Result<Self, AddressError> {
        let uri: Uri = address.parse()?;
        Self::from_uri(&uri)
    }

    /// Resolve an already-parsed URI.
    pub fn from_uri(uri: &Uri) -> Result<Self, AddressError> {
        let scheme: Scheme = uri
            .scheme_str()
            .ok_or(AddressError::MissingScheme)?
            .parse()?;

        let authority = uri.authority().ok_or(AddressError::MissingHost)?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }

        let credential = match authority.as_str().rsplit_once('@') {
            Some((user_info, _)) if !user_info.is_empty() => {
                Some(Credential::from_user_info(user_info)?)
            }
            _ => None,
        };

        Ok(Self {
            scheme,
            host: host.to_owned(),
            port: explicit_port(authority.as_str())?,
            credential,
        })
    }

    /// The security scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The host name, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, if the address carried one.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The inline credential, if the address carried one.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::resolve(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// The port written in an authority, if any. An empty port is the same as none.
fn explicit_port(authority: &str) -> Result<Option<u16>, AddressError> {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };

    match after_host.rsplit_once(':') {
        None | Some((_, "")) => Ok(None),
        Some((_, port)) => port
            .parse()
            .map(Some)
            .map_err(|_| AddressError::InvalidPort(port.to_owned())),
    }
}

fn percent_decode(input: &str) -> Result<String, AddressError> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let (high, low) = match bytes.get(i + 1..i + 3) {
                Some(&[high, low]) => (hex_value(high)?, hex_value(low)?),
                _ => return Err(AddressError::InvalidEncoding),
            };
            decoded.push(high << 4 | low);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| AddressError::InvalidEncoding)
}

fn hex_value(digit: u8) -> Result<u8, AddressError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(AddressError::InvalidEncoding),
    }
}
