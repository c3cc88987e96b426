//! Firmware version parsing
//!
//! The `V` query answers with a banner whose shape varies across
//! firmware generations ("EBBv13_and_above EB Firmware Version 2.5.3",
//! "V,2.9.1", ...). The extractor is deliberately lenient: it pulls the
//! first dotted numeric triple (or pair) out of whatever the banner
//! says.

use serde::{Deserialize, Serialize};

/// Parsed firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version; zero when the banner carries only two components
    pub patch: u32,
}

impl FirmwareVersion {
    /// Extract a version from a banner line, if one is present.
    pub fn parse(banner: &str) -> Option<Self> {
        banner
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .find_map(Self::parse_dotted)
    }

    fn parse_dotted(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(patch) => patch.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_banner() {
        let version =
            FirmwareVersion::parse("EBBv13_and_above EB Firmware Version 2.5.3").unwrap();
        assert_eq!(version.to_string(), "2.5.3");
    }

    #[test]
    fn parses_terse_banner() {
        let version = FirmwareVersion::parse("V,2.9.1").unwrap();
        assert_eq!(
            version,
            FirmwareVersion {
                major: 2,
                minor: 9,
                patch: 1
            }
        );
    }

    #[test]
    fn two_component_versions_get_a_zero_patch() {
        let version = FirmwareVersion::parse("Firmware 2.8").unwrap();
        assert_eq!(version.to_string(), "2.8.0");
    }

    #[test]
    fn banners_without_a_version_yield_none() {
        assert!(FirmwareVersion::parse("hello world").is_none());
        assert!(FirmwareVersion::parse("").is_none());
    }

    #[test]
    fn versions_order_numerically() {
        let old = FirmwareVersion::parse("2.5.3").unwrap();
        let new = FirmwareVersion::parse("2.10.0").unwrap();
        assert!(new > old);
    }
}
