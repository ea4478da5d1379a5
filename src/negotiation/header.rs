//! The 8-byte protocol header exchanged before each protocol layer.
//!
//! ```text
//! +---+---+---+---+------+-------+-------+----------+
//! | A | M | Q | P |  id  | major | minor | revision |
//! +---+---+---+---+------+-------+-------+----------+
//! ```

use std::fmt;

use thiserror::Error;

use super::ProtocolVersion;

const MAGIC: &[u8; 4] = b"AMQP";

/// Length of an encoded protocol header.
pub const HEADER_LEN: usize = 8;

/// Protocol identifier carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    /// AMQP 1.0 framing.
    Amqp,

    /// TLS negotiated in-band.
    Tls,

    /// SASL authentication.
    Sasl,
}

impl ProtocolId {
    /// The identifier byte on the wire.
    pub fn as_u8(&self) -> u8 {
        match self {
            ProtocolId::Amqp => 0,
            ProtocolId::Tls => 2,
            ProtocolId::Sasl => 3,
        }
    }
}

impl TryFrom<u8> for ProtocolId {
    type Error = InvalidHeader;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProtocolId::Amqp),
            2 => Ok(ProtocolId::Tls),
            3 => Ok(ProtocolId::Sasl),
            other => Err(InvalidHeader::UnknownProtocol(other)),
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolId::Amqp => f.write_str("AMQP"),
            ProtocolId::Tls => f.write_str("TLS"),
            ProtocolId::Sasl => f.write_str("SASL"),
        }
    }
}

/// Error returned when bytes received from a peer aren't a protocol header.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidHeader {
    /// Wrong number of bytes.
    #[error("protocol header must be {HEADER_LEN} bytes, got {0}")]
    Length(usize),

    /// The header doesn't start with `AMQP`.
    #[error("protocol header has bad prefix {0:?}")]
    Prefix([u8; 4]),

    /// The protocol id isn't one we know.
    #[error("unknown protocol id {0}")]
    UnknownProtocol(u8),
}

/// A protocol header: which protocol layer, at which version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolHeader {
    id: ProtocolId,
    version: ProtocolVersion,
}

impl ProtocolHeader {
    /// Create a header.
    pub fn new(id: ProtocolId, version: ProtocolVersion) -> Self {
        Self { id, version }
    }

    /// The protocol layer.
    pub fn id(&self) -> ProtocolId {
        self.id
    }

    /// The protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        [
            MAGIC[0],
            MAGIC[1],
            MAGIC[2],
            MAGIC[3],
            self.id.as_u8(),
            self.version.major(),
            self.version.minor(),
            self.version.revision(),
        ]
    }

    /// Decode a header received from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidHeader> {
        let bytes: &[u8; HEADER_LEN] = bytes
            .try_into()
            .map_err(|_| InvalidHeader::Length(bytes.len()))?;

        if &bytes[..4] != MAGIC {
            return Err(InvalidHeader::Prefix([bytes[0], bytes[1], bytes[2], bytes[3]]));
        }

        Ok(Self {
            id: ProtocolId::try_from(bytes[4])?,
            version: ProtocolVersion::new(bytes[5], bytes[6], bytes[7]),
        })
    }
}

impl fmt::Display for ProtocolHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sasl_header_bytes() {
        let header = ProtocolHeader::new(ProtocolId::Sasl, ProtocolVersion::V1_0_0);
        assert_eq!(&header.to_bytes(), b"AMQP\x03\x01\x00\x00");
        assert_eq!(header.to_string(), "SASL 1.0.0");
    }

    #[test]
    fn decode_amqp_header() {
        let header = ProtocolHeader::from_bytes(b"AMQP\x00\x01\x00\x00").unwrap();
        assert_eq!(header.id(), ProtocolId::Amqp);
        assert_eq!(header.version(), ProtocolVersion::V1_0_0);
    }

    #[test]
    fn decode_rejects_http() {
        assert_eq!(
            ProtocolHeader::from_bytes(b"HTTP/1.1"),
            Err(InvalidHeader::Prefix(*b"HTTP"))
        );
        assert_eq!(
            ProtocolHeader::from_bytes(b"AMQP\x01\x01\x00\x00"),
            Err(InvalidHeader::UnknownProtocol(1))
        );
        assert_eq!(
            ProtocolHeader::from_bytes(b"AMQP"),
            Err(InvalidHeader::Length(4))
        );
    }
}
