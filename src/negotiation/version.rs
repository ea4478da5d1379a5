use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a version string can't be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid protocol version {0:?}")]
pub struct InvalidVersion(String);

/// A three-component protocol version, `major.minor.revision`.
///
/// Four-component versions (`1.0.0.0`) are accepted and normalized by dropping the
/// last component, so both spellings of AMQP 1.0 compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    major: u8,
    minor: u8,
    revision: u8,
}

impl ProtocolVersion {
    /// Version 1.0.0, used by both AMQP 1.0 and its SASL layer.
    pub const V1_0_0: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

    /// Create a version from its components.
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Major version.
    pub fn major(&self) -> u8 {
        self.major
    }

    /// Minor version.
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Revision.
    pub fn revision(&self) -> u8 {
        self.revision
    }
}

impl From<(u8, u8, u8)> for ProtocolVersion {
    fn from((major, minor, revision): (u8, u8, u8)) -> Self {
        Self::new(major, minor, revision)
    }
}

impl From<(u8, u8, u8, u8)> for ProtocolVersion {
    fn from((major, minor, revision, _): (u8, u8, u8, u8)) -> Self {
        Self::new(major, minor, revision)
    }
}

impl FromStr for ProtocolVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion(s.to_owned());

        let parts = s
            .split('.')
            .map(|part| part.parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match parts.as_slice() {
            [major, minor, revision] | [major, minor, revision, _] => {
                Ok(Self::new(*major, *minor, *revision))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_components_normalize() {
        let three: ProtocolVersion = "1.0.0".parse().unwrap();
        let four: ProtocolVersion = "1.0.0.0".parse().unwrap();
        assert_eq!(three, four);
        assert_eq!(four, ProtocolVersion::V1_0_0);
        assert_eq!(ProtocolVersion::from((1, 0, 0, 0)), ProtocolVersion::V1_0_0);
    }

    #[test]
    fn rejects_garbage() {
        assert!("1.0".parse::<ProtocolVersion>().is_err());
        assert!("1.0.0.0.0".parse::<ProtocolVersion>().is_err());
        assert!("1.x.0".parse::<ProtocolVersion>().is_err());
        assert!("256.0.0".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(ProtocolVersion::new(1, 2, 3).to_string(), "1.2.3");
    }
}
