//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Task ids must match `bd-<token>(.<token>)*` with lowercase
    /// alphanumeric tokens.
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// Module ids are `category/name` with lowercase segments.
    #[error("invalid module id: {0}")]
    InvalidModuleId(String),

    /// Spec ids are relative, `/`-separated document paths.
    #[error("invalid spec id: {0}")]
    InvalidSpecId(String),

    /// Rule ids are non-empty and whitespace-free.
    #[error("invalid rule id: {0}")]
    InvalidRuleId(String),
}

fn is_segment(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// A task identifier: `bd-<token>(.<token>)*`.
///
/// Tokens are lowercase alphanumeric. `bd-x1`, `bd-x1.2`, `bd-auth.login`
/// are valid; `BD-123`, `bd_123` and `123-bd` are not.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Parse and validate a task id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let rest = s
            .strip_prefix("bd-")
            .ok_or_else(|| IdError::InvalidTaskId(s.to_string()))?;
        if rest.is_empty() {
            return Err(IdError::InvalidTaskId(s.to_string()));
        }
        let tokens_ok = rest
            .split('.')
            .all(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        if !tokens_ok {
            return Err(IdError::InvalidTaskId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Ids deserialize through `parse` so malformed values from external
// stores are rejected at the boundary, not carried into the manifest.
impl Serialize for TaskId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A module identifier: `(category, name)`, rendered `category/name`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId {
    category: String,
    name: String,
}

impl ModuleId {
    /// Build a module id from validated segments.
    pub fn new(category: &str, name: &str) -> Result<Self, IdError> {
        if !is_segment(category) || !is_segment(name) {
            return Err(IdError::InvalidModuleId(format!("{}/{}", category, name)));
        }
        Ok(Self {
            category: category.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse a `category/name` string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (category, name) = s
            .split_once('/')
            .ok_or_else(|| IdError::InvalidModuleId(s.to_string()))?;
        if name.contains('/') {
            return Err(IdError::InvalidModuleId(s.to_string()));
        }
        Self::new(category, name)
    }

    /// The category segment.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The name segment.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({}/{})", self.category, self.name)
    }
}

impl FromStr for ModuleId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModuleId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A spec identifier derived from the document path relative to the spec
/// root, without the `.md` extension.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecId(String);

impl SpecId {
    /// Parse and validate a spec id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty()
            || s.starts_with('/')
            || s.ends_with('/')
            || s.contains('\\')
            || s.contains("..")
            || s.split('/').any(str::is_empty)
        {
            return Err(IdError::InvalidSpecId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpecId({})", self.0)
    }
}

impl FromStr for SpecId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SpecId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SpecId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A rule identifier. Rules are named by the owning module plus the rule
/// file stem, e.g. `coding-standard/go/error-handling`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(String);

impl RuleId {
    /// Wrap a rule id. Rule ids are manifest-owned and only lightly
    /// validated: non-empty, no whitespace.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(IdError::InvalidRuleId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleId({})", self.0)
    }
}

impl Serialize for RuleId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
