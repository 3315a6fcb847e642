//! Module and collection types.

use guidepost_common_core::ModuleId;
use guidepost_version::{DependencySpec, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// The closed set of module categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Language or project coding standards.
    CodingStandard,
    /// Framework-specific guidance.
    Framework,
    /// Platform or hosting guidance.
    Platform,
    /// Process and workflow guidance.
    Workflow,
    /// Documentation-writing guidance.
    Documentation,
}

impl ModuleKind {
    /// All accepted descriptor values, for error messages.
    pub const VALUES: [&'static str; 5] = [
        "coding-standard",
        "framework",
        "platform",
        "workflow",
        "documentation",
    ];

    /// Parse a descriptor `type` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coding-standard" => Some(Self::CodingStandard),
            "framework" => Some(Self::Framework),
            "platform" => Some(Self::Platform),
            "workflow" => Some(Self::Workflow),
            "documentation" => Some(Self::Documentation),
            _ => None,
        }
    }

    /// The descriptor spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodingStandard => "coding-standard",
            Self::Framework => "framework",
            Self::Platform => "platform",
            Self::Workflow => "workflow",
            Self::Documentation => "documentation",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered, validated guidance module.
///
/// Immutable once loaded; a new discovery pass rebuilds the whole set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// `(category, name)` identifier, unique within a discovery pass.
    pub id: ModuleId,
    /// Declared semantic version.
    pub version: Version,
    /// Human-readable name.
    pub display_name: String,
    /// One-line description.
    pub description: String,
    /// Category of guidance.
    pub kind: ModuleKind,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
    /// Ordered dependency declarations.
    pub dependencies: Vec<DependencySpec>,
    /// Directory holding the rule files.
    pub rules_dir: PathBuf,
    /// Directory holding example files, when present.
    pub examples_dir: Option<PathBuf>,
    /// Module directory root.
    pub root: PathBuf,
}

/// A named bundle of module references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name (file stem of the descriptor).
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Member module references, in declaration order.
    pub members: Vec<DependencySpec>,
    /// Non-fatal problems found while validating the collection, e.g.
    /// members that did not resolve against the module index.
    pub warnings: Vec<String>,
    /// Descriptor file path.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_kind_parse() {
        assert_eq!(ModuleKind::parse("coding-standard"), Some(ModuleKind::CodingStandard));
        assert_eq!(ModuleKind::parse("workflow"), Some(ModuleKind::Workflow));
        assert_eq!(ModuleKind::parse("CodingStandard"), None);
        assert_eq!(ModuleKind::parse("plugin"), None);
    }

    #[test]
    fn test_module_kind_serde() {
        let json = serde_json::to_string(&ModuleKind::CodingStandard).unwrap();
        assert_eq!(json, "\"coding-standard\"");
        let kind: ModuleKind = serde_json::from_str("\"documentation\"").unwrap();
        assert_eq!(kind, ModuleKind::Documentation);
    }

    #[test]
    fn test_module_kind_values_cover_parse() {
        for value in ModuleKind::VALUES {
            assert!(ModuleKind::parse(value).is_some(), "{value} should parse");
        }
    }
}
