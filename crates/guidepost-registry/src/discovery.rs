//! Module and collection discovery.
//!
//! Discovery walks `<root>/<category>/<module>/` and `<root>/collections/`.
//! Every candidate loads and validates independently: a broken module is
//! recorded and skipped, never fatal to the pass. Only a missing root is a
//! hard error.

use crate::descriptor::{module_from_value, validate_metadata, DESCRIPTOR_FILE};
use crate::structure::validate_structure;
use crate::types::{Collection, Module};
use crate::RegistryError;
use guidepost_common_core::ModuleId;
use guidepost_version::DependencySpec;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory of collection descriptors under the module root.
pub const COLLECTIONS_DIR: &str = "collections";

/// A problem found with one discovery candidate.
#[derive(Debug, Clone)]
pub struct DiscoveryIssue {
    /// The offending path (module directory or descriptor file).
    pub path: PathBuf,
    /// Problem class.
    pub kind: IssueKind,
    /// Human-readable message.
    pub message: String,
}

/// Classes of discovery problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Missing required file or directory.
    Structure,
    /// Missing or invalid descriptor field.
    Metadata,
    /// Malformed identifier or unparsable document.
    Format,
    /// Second module claiming an already-discovered id.
    Duplicate,
}

/// Result of a module discovery pass.
#[derive(Debug, Default)]
pub struct ModuleDiscovery {
    /// Modules that loaded and validated, sorted by id.
    pub modules: Vec<Module>,
    /// Candidates that were skipped, with why.
    pub issues: Vec<DiscoveryIssue>,
    /// Non-fatal observations on loaded modules.
    pub warnings: Vec<DiscoveryIssue>,
}

impl ModuleDiscovery {
    /// Build a lookup index over the discovered modules.
    pub fn index(&self) -> ModuleIndex {
        ModuleIndex::from_modules(&self.modules)
    }
}

/// Lookup index over discovered modules.
#[derive(Debug, Default, Clone)]
pub struct ModuleIndex {
    modules: BTreeMap<ModuleId, Module>,
}

impl ModuleIndex {
    /// Index a slice of modules.
    pub fn from_modules(modules: &[Module]) -> Self {
        Self {
            modules: modules.iter().map(|m| (m.id.clone(), m.clone())).collect(),
        }
    }

    /// Look up a module by id.
    pub fn get(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Does the index contain this id?
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Number of indexed modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Is the index empty?
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate over indexed modules in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }
}

/// Result of a collection discovery pass.
#[derive(Debug, Default)]
pub struct CollectionDiscovery {
    /// Collections that parsed, sorted by name. Unresolved member
    /// references are warnings on the individual collection.
    pub collections: Vec<Collection>,
    /// Descriptor files that were skipped, with why.
    pub issues: Vec<DiscoveryIssue>,
}

/// Walk category subdirectories of `root` and load every module candidate.
///
/// Partial-failure isolation is the contract here: whatever succeeded is
/// returned, and everything else lands in `issues`.
pub async fn discover_modules(root: &Path) -> Result<ModuleDiscovery, RegistryError> {
    if !root.is_dir() {
        return Err(RegistryError::RootNotFound(root.to_path_buf()));
    }

    let mut discovery = ModuleDiscovery::default();
    let mut seen: BTreeMap<ModuleId, PathBuf> = BTreeMap::new();

    for category_dir in guidepost_common_fs::list_dirs(root)? {
        let category = match category_dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if category.starts_with('.') || category == COLLECTIONS_DIR {
            continue;
        }

        for module_dir in guidepost_common_fs::list_dirs(&category_dir)? {
            load_candidate(&module_dir, &category, &mut seen, &mut discovery).await;
        }
    }

    discovery.modules.sort_by(|a, b| a.id.cmp(&b.id));
    debug!(
        modules = discovery.modules.len(),
        issues = discovery.issues.len(),
        "module discovery complete"
    );
    Ok(discovery)
}

async fn load_candidate(
    module_dir: &Path,
    category: &str,
    seen: &mut BTreeMap<ModuleId, PathBuf>,
    discovery: &mut ModuleDiscovery,
) {
    let structure = validate_structure(module_dir).await;
    for message in &structure.warnings {
        discovery.warnings.push(DiscoveryIssue {
            path: module_dir.to_path_buf(),
            kind: IssueKind::Structure,
            message: message.clone(),
        });
    }
    if !structure.valid() {
        for message in structure.errors {
            discovery.issues.push(DiscoveryIssue {
                path: module_dir.to_path_buf(),
                kind: IssueKind::Structure,
                message,
            });
        }
        return;
    }

    // Structure validation proved the descriptor parses; a race with a
    // concurrent edit still just skips this one candidate.
    let descriptor_path = module_dir.join(DESCRIPTOR_FILE);
    let value: Value = match tokio::fs::read_to_string(&descriptor_path)
        .await
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(value) => value,
        None => {
            discovery.issues.push(DiscoveryIssue {
                path: descriptor_path,
                kind: IssueKind::Format,
                message: "Descriptor became unreadable during discovery".to_string(),
            });
            return;
        }
    };

    let metadata = validate_metadata(&value);
    for message in &metadata.warnings {
        discovery.warnings.push(DiscoveryIssue {
            path: descriptor_path.clone(),
            kind: IssueKind::Metadata,
            message: message.clone(),
        });
    }
    if !metadata.valid() {
        for message in metadata.errors {
            discovery.issues.push(DiscoveryIssue {
                path: descriptor_path.clone(),
                kind: IssueKind::Metadata,
                message,
            });
        }
        return;
    }

    if let (Some(declared), Some(dir_name)) = (
        value.get("name").and_then(Value::as_str),
        module_dir.file_name().and_then(|n| n.to_str()),
    ) {
        if declared != dir_name {
            discovery.warnings.push(DiscoveryIssue {
                path: module_dir.to_path_buf(),
                kind: IssueKind::Metadata,
                message: format!(
                    "Descriptor name '{declared}' does not match directory name '{dir_name}'"
                ),
            });
        }
    }

    let module = match module_from_value(module_dir, category, &value) {
        Some(module) => module,
        None => {
            let declared = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            discovery.issues.push(DiscoveryIssue {
                path: module_dir.to_path_buf(),
                kind: IssueKind::Format,
                message: format!("Invalid module id: {category}/{declared}"),
            });
            return;
        }
    };

    if let Some(first) = seen.get(&module.id) {
        warn!(id = %module.id, "duplicate module id; keeping first discovered");
        discovery.issues.push(DiscoveryIssue {
            path: module_dir.to_path_buf(),
            kind: IssueKind::Duplicate,
            message: format!(
                "Duplicate module id {} (first discovered at {})",
                module.id,
                first.display()
            ),
        });
        return;
    }

    seen.insert(module.id.clone(), module_dir.to_path_buf());
    discovery.modules.push(module);
}

#[derive(Debug, Deserialize)]
struct CollectionDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    modules: Vec<String>,
}

/// Load collection descriptors from `<root>/collections/*.json`, checking
/// member references against the discovered module index.
pub async fn discover_collections(
    root: &Path,
    index: &ModuleIndex,
) -> Result<CollectionDiscovery, RegistryError> {
    if !root.is_dir() {
        return Err(RegistryError::RootNotFound(root.to_path_buf()));
    }

    let collections_dir = root.join(COLLECTIONS_DIR);
    let mut discovery = CollectionDiscovery::default();
    if !collections_dir.is_dir() {
        debug!(root = %root.display(), "no collections directory");
        return Ok(discovery);
    }

    for path in guidepost_common_fs::list_files(&collections_dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };

        let descriptor: CollectionDescriptor = match tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                discovery.issues.push(DiscoveryIssue {
                    path,
                    kind: IssueKind::Format,
                    message: format!("Invalid JSON in collection descriptor: {e}"),
                });
                continue;
            }
        };

        let mut collection = Collection {
            name: stem.clone(),
            description: descriptor.description,
            members: Vec::new(),
            warnings: Vec::new(),
            path: path.clone(),
        };

        if let Some(declared) = descriptor.name {
            if declared != stem {
                collection.warnings.push(format!(
                    "Descriptor name '{declared}' does not match file name '{stem}'"
                ));
            }
        }

        for member in descriptor.modules {
            let spec = match DependencySpec::parse(&member) {
                Ok(spec) => spec,
                Err(_) => {
                    collection
                        .warnings
                        .push(format!("Invalid member reference: {member}"));
                    continue;
                }
            };

            match index.get(&spec.module) {
                None => collection
                    .warnings
                    .push(format!("References unknown module: {}", spec.module)),
                Some(module) if !spec.range.satisfies(&module.version) => {
                    collection.warnings.push(format!(
                        "Requires {}@{} but discovered version is {}",
                        spec.module, spec.range, module.version
                    ));
                }
                Some(_) => {}
            }
            collection.members.push(spec);
        }

        discovery.collections.push(collection);
    }

    discovery.collections.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(discovery)
}
