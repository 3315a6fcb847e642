//! Version range expressions.

use crate::VersionError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A version range: `^`, `~`, `>=`, `>`, `<=`, `<` expressions, `*` (any),
/// or a bare version meaning exact match.
///
/// The raw text is kept so descriptors round-trip unchanged.
#[derive(Debug, Clone)]
pub struct VersionRange {
    raw: String,
    req: Option<VersionReq>,
}

impl VersionRange {
    /// The unconstrained range.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            req: None,
        }
    }

    /// Parse a range expression.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        // A bare version is an exact requirement. `VersionReq` would treat
        // it as a caret range, which is not what descriptor authors wrote.
        let normalized = if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            format!("={trimmed}")
        } else {
            trimmed.to_string()
        };

        let req = VersionReq::parse(&normalized)
            .map_err(|_| VersionError::InvalidRange(s.to_string()))?;

        Ok(Self {
            raw: trimmed.to_string(),
            req: Some(req),
        })
    }

    /// Does `version` satisfy this range?
    pub fn satisfies(&self, version: &Version) -> bool {
        match &self.req {
            None => true,
            Some(req) => req.matches(version),
        }
    }

    /// Is this the unconstrained range?
    pub fn is_any(&self) -> bool {
        self.req.is_none()
    }

    /// The range expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for VersionRange {}

impl Serialize for VersionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_version;
    use test_case::test_case;

    #[test_case("^1.0.0", "1.0.0", true; "caret lower bound")]
    #[test_case("^1.0.0", "1.9.3", true; "caret minor drift")]
    #[test_case("^1.0.0", "2.0.0", false; "caret next major")]
    #[test_case("^0.2.0", "0.2.5", true; "caret zero major patch drift")]
    #[test_case("^0.2.0", "0.3.0", false; "caret zero major next minor")]
    #[test_case("~1.2.3", "1.2.9", true; "tilde patch drift")]
    #[test_case("~1.2.3", "1.3.0", false; "tilde next minor")]
    #[test_case(">=1.0.0", "1.0.0", true; "gte inclusive")]
    #[test_case(">=1.0.0", "0.9.9", false; "gte below")]
    #[test_case(">1.0.0", "1.0.0", false; "gt exclusive")]
    #[test_case(">1.0.0", "1.0.1", true; "gt above")]
    #[test_case("<=2.0.0", "2.0.0", true; "lte inclusive")]
    #[test_case("<=2.0.0", "2.0.1", false; "lte above")]
    #[test_case("<2.0.0", "1.9.9", true; "lt below")]
    #[test_case("<2.0.0", "2.0.0", false; "lt boundary")]
    #[test_case("1.2.3", "1.2.3", true; "bare exact match")]
    #[test_case("1.2.3", "1.2.4", false; "bare exact mismatch")]
    #[test_case("*", "0.0.1", true; "star any")]
    fn test_satisfies(range: &str, version: &str, expected: bool) {
        let range = VersionRange::parse(range).unwrap();
        let version = parse_version(version).unwrap();
        assert_eq!(range.satisfies(&version), expected);
    }

    #[test]
    fn test_empty_is_any() {
        let range = VersionRange::parse("").unwrap();
        assert!(range.is_any());
        assert!(range.satisfies(&parse_version("99.0.0").unwrap()));
    }

    #[test]
    fn test_invalid_range() {
        for s in ["nonsense", "^^1.0.0", "=> 1.0"] {
            assert!(VersionRange::parse(s).is_err(), "{s} should be rejected");
        }
    }

    #[test]
    fn test_display_preserves_raw() {
        let range = VersionRange::parse("^1.0.0").unwrap();
        assert_eq!(range.to_string(), "^1.0.0");
        let range = VersionRange::parse("1.2.3").unwrap();
        assert_eq!(range.to_string(), "1.2.3");
    }
}
