//! Protocol version stamped on every client message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol version as `major.minor`.
///
/// A client and the daemon interoperate when their major versions agree.
/// Minor bumps only add optional fields or message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Version spoken by this build.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_bumps_stay_compatible() {
        let current = ProtocolVersion::CURRENT;
        let next_minor = ProtocolVersion::new(current.major, current.minor + 1);
        let next_major = ProtocolVersion::new(current.major + 1, 0);

        assert!(current.is_compatible_with(&next_minor));
        assert!(next_minor.is_compatible_with(&current));
        assert!(!current.is_compatible_with(&next_major));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(ProtocolVersion::new(1, 3)).unwrap();
        assert_eq!(json, serde_json::json!({ "major": 1, "minor": 3 }));
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::CURRENT);
        assert_eq!(ProtocolVersion::new(1, 3).to_string(), "1.3");
    }
}
