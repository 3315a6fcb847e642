//! Module descriptor validation.
//!
//! The descriptor is `module.json` in each module directory. Validation
//! works on the raw JSON value so a single bad field produces a precise
//! message instead of a serde type error for the whole document.

use crate::types::{Module, ModuleKind};
use guidepost_common_core::ModuleId;
use guidepost_version::{parse_version, DependencySpec};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

/// Descriptor file name.
pub const DESCRIPTOR_FILE: &str = "module.json";

/// Required descriptor fields, validated in this order.
const REQUIRED_FIELDS: [&str; 5] = ["name", "version", "displayName", "description", "type"];

/// Known descriptor fields; anything else draws a warning.
const KNOWN_FIELDS: [&str; 7] = [
    "name",
    "version",
    "displayName",
    "description",
    "type",
    "tags",
    "dependencies",
];

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Fatal problems. Empty iff the subject is valid.
    pub errors: Vec<String>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when no errors were recorded.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub(crate) fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate raw descriptor metadata.
///
/// Checks required fields, the `type` enum, the version format, and the
/// shapes of `tags` and `dependencies`.
pub fn validate_metadata(raw: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => {
            report.error("Descriptor must be a JSON object");
            return report;
        }
    };

    for field in REQUIRED_FIELDS {
        match obj.get(field) {
            None | Some(Value::Null) => {
                report.error(format!("Missing required field: {field}"));
            }
            Some(value) if !value.is_string() => {
                report.error(format!("Field '{field}' must be a string"));
            }
            Some(_) => {}
        }
    }

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        if ModuleKind::parse(kind).is_none() {
            report.error(format!("Invalid type: {kind}"));
        }
    }

    if let Some(version) = obj.get("version").and_then(Value::as_str) {
        if parse_version(version).is_err() {
            report.error("Invalid version format");
        }
    }

    for field in ["tags", "dependencies"] {
        if let Some(value) = obj.get(field) {
            let strings = value
                .as_array()
                .map(|items| items.iter().all(Value::is_string));
            if strings != Some(true) {
                report.error(format!("Field '{field}' must be an array of strings"));
            }
        }
    }

    if let Some(Value::Array(deps)) = obj.get("dependencies") {
        for dep in deps.iter().filter_map(Value::as_str) {
            if DependencySpec::parse(dep).is_err() {
                report.error(format!("Invalid dependency spec: {dep}"));
            }
        }
    }

    for field in obj.keys() {
        if !KNOWN_FIELDS.contains(&field.as_str()) {
            report.warning(format!("Unknown field: {field}"));
        }
    }

    report
}

/// Build a [`Module`] from a descriptor that already passed
/// [`validate_metadata`]. Returns `None` when the descriptor or the
/// directory ids fall outside what validation guarantees.
pub(crate) fn module_from_value(dir: &Path, category: &str, raw: &Value) -> Option<Module> {
    let obj = raw.as_object()?;
    let name = obj.get("name")?.as_str()?;
    let id = ModuleId::new(category, name).ok()?;
    let version = parse_version(obj.get("version")?.as_str()?).ok()?;

    let tags: BTreeSet<String> = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let dependencies: Vec<DependencySpec> = obj
        .get("dependencies")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| DependencySpec::parse(s).ok())
                .collect()
        })
        .unwrap_or_default();

    let examples_dir = dir.join("examples");
    Some(Module {
        id,
        version,
        display_name: obj.get("displayName")?.as_str()?.to_string(),
        description: obj.get("description")?.as_str()?.to_string(),
        kind: ModuleKind::parse(obj.get("type")?.as_str()?)?,
        tags,
        dependencies,
        rules_dir: dir.join("rules"),
        examples_dir: examples_dir.is_dir().then_some(examples_dir),
        root: dir.to_path_buf(),
    })
}

/// Load a module from its directory.
///
/// Returns `None` — never an error — when the descriptor is missing or
/// unparsable, so a bulk caller can skip and continue.
pub async fn load_module(dir: &Path) -> Option<Module> {
    let category = dir.parent()?.file_name()?.to_str()?.to_string();

    let raw = tokio::fs::read_to_string(dir.join(DESCRIPTOR_FILE)).await.ok()?;
    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "unparsable descriptor");
            return None;
        }
    };

    module_from_value(dir, &category, &value)
}
