//! Semantic version utilities.
//!
//! Thin layer over the `semver` crate: parsing with a uniform error
//! message, range matching with npm-style bare-version semantics, and
//! `module-id[@range]` dependency specs.

pub mod range;

pub use range::VersionRange;
pub use semver::Version;

use guidepost_common_core::ModuleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version handling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Not a `MAJOR.MINOR.PATCH[-prerelease][+build]` string.
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    /// Not a supported range expression.
    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    /// Not a `category/name[@range]` dependency spec.
    #[error("Invalid dependency spec: {0}")]
    InvalidDependencySpec(String),
}

/// Parse a semantic version string.
pub fn parse_version(s: &str) -> Result<Version, VersionError> {
    Version::parse(s.trim()).map_err(|_| VersionError::InvalidFormat(s.to_string()))
}

/// A dependency on another module, optionally constrained to a range.
///
/// Written `category/name` or `category/name@^1.0.0` in descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// The depended-upon module.
    pub module: ModuleId,
    /// Required version range; absent means any version.
    pub range: VersionRange,
}

impl DependencySpec {
    /// Parse a `category/name[@range]` string.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let (id_part, range_part) = match s.split_once('@') {
            Some((id, range)) => (id, Some(range)),
            None => (s, None),
        };

        let module = ModuleId::parse(id_part)
            .map_err(|_| VersionError::InvalidDependencySpec(s.to_string()))?;
        let range = match range_part {
            Some(r) => VersionRange::parse(r)?,
            None => VersionRange::any(),
        };

        Ok(Self { module, range })
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.is_any() {
            write!(f, "{}", self.module)
        } else {
            write!(f, "{}@{}", self.module, self.range)
        }
    }
}

impl FromStr for DependencySpec {
    type Err = VersionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DependencySpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DependencySpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
