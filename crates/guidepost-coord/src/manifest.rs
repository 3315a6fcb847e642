//! The coordination manifest.
//!
//! A single JSON document with four maps: specs, tasks, rules, files.
//! Every map is a `BTreeMap` so serialization is deterministic — the
//! idempotence contract (unchanged sources produce a byte-identical file)
//! rests on that. The `version` counter only advances on effective writes
//! and is the query layer's cache key.

use crate::CoordError;
use chrono::{DateTime, Utc};
use guidepost_common_core::{RuleId, SpecId, SpecStatus, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of dependency edge between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// This task blocks the referenced task.
    Blocks,
    /// This task is blocked by the referenced task.
    BlockedBy,
}

/// A dependency edge between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEdge {
    /// The other task.
    pub id: TaskId,
    /// Edge direction.
    pub kind: EdgeKind,
}

/// Manifest projection of one spec document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecEntry {
    /// Active or archived. Archival keeps the entry.
    pub status: SpecStatus,
    /// Title from frontmatter, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Document path relative to the spec root.
    pub path: String,
    /// Related task ids declared in frontmatter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskId>,
    /// File glob patterns this spec governs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Manifest-only rule associations, preserved across re-sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_rules: Vec<RuleId>,
}

/// Manifest projection of one task's effective state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Folded task status. Closure is terminal.
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// The spec this task implements, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<SpecId>,
    /// Dependency edges to other tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskEdge>,
    /// Manifest-only rule associations, preserved across re-sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_rules: Vec<RuleId>,
}

/// A rule known to the manifest. The rules map is manifest-owned: sync
/// preserves it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Owning module id (`category/name`).
    pub module: String,
    /// Rule file path within the module's rules directory.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Direct file associations. The `tasks` list is manifest-only state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileEntry {
    /// Tasks directly associated with this path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskId>,
    /// Spec associated with this path, when pinned explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<SpecId>,
}

/// The coordination manifest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Monotonic write counter.
    pub version: u64,
    /// Spec projections.
    #[serde(default)]
    pub specs: BTreeMap<SpecId, SpecEntry>,
    /// Task projections.
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, TaskEntry>,
    /// Rule registry (manifest-owned).
    #[serde(default)]
    pub rules: BTreeMap<RuleId, RuleEntry>,
    /// Direct file associations.
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

impl Manifest {
    /// Load the manifest, or start empty when the file does not exist yet.
    pub async fn load_or_default(path: &Path) -> Result<Self, CoordError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the manifest atomically (temp file + rename), so a concurrent
    /// reader never observes a partial document.
    pub fn store(&self, path: &Path) -> Result<(), CoordError> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        guidepost_common_fs::write_string_atomic(path, &rendered)?;
        debug!(path = %path.display(), version = self.version, "manifest written");
        Ok(())
    }

    /// Remove a task and strip every reference to it. Returns a warning
    /// per stripped reference.
    pub fn remove_task(&mut self, id: &TaskId) -> Vec<String> {
        let mut warnings = Vec::new();
        self.tasks.remove(id);

        for (spec_id, entry) in self.specs.iter_mut() {
            if entry.tasks.iter().any(|t| t == id) {
                entry.tasks.retain(|t| t != id);
                warnings.push(format!(
                    "dropped removed task {id} from spec {spec_id}"
                ));
            }
        }
        for (path, entry) in self.files.iter_mut() {
            if entry.tasks.iter().any(|t| t == id) {
                entry.tasks.retain(|t| t != id);
                warnings.push(format!("dropped removed task {id} from file {path}"));
            }
        }
        warnings
    }

    /// Remove a spec and clear every reference to it. Returns a warning
    /// per cleared reference.
    pub fn remove_spec(&mut self, id: &SpecId) -> Vec<String> {
        let mut warnings = Vec::new();
        self.specs.remove(id);

        for (task_id, entry) in self.tasks.iter_mut() {
            if entry.spec.as_ref() == Some(id) {
                entry.spec = None;
                warnings.push(format!(
                    "dropped removed spec {id} reference from task {task_id}"
                ));
            }
        }
        for (path, entry) in self.files.iter_mut() {
            if entry.spec.as_ref() == Some(id) {
                entry.spec = None;
                warnings.push(format!("dropped removed spec {id} reference from file {path}"));
            }
        }
        warnings
    }
}

/// Advisory lock guarding manifest writes.
///
/// Created with `create_new` semantics; an existing lock file means
/// another sync is in flight and surfaces as
/// [`CoordError::Concurrency`]. The file is removed on drop.
#[derive(Debug)]
pub struct ManifestLock {
    path: PathBuf,
}

impl ManifestLock {
    /// Acquire the lock, failing fast on contention.
    pub fn acquire(path: PathBuf) -> Result<Self, CoordError> {
        if let Some(parent) = path.parent() {
            guidepost_common_fs::ensure_dir(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(CoordError::Concurrency(path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn spec_id(s: &str) -> SpecId {
        SpecId::parse(s).unwrap()
    }

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::default();
        manifest.specs.insert(
            spec_id("auth/login"),
            SpecEntry {
                status: SpecStatus::Active,
                title: Some("Login flow".to_string()),
                path: "auth/login.md".to_string(),
                tasks: vec![task_id("bd-x1"), task_id("bd-x2")],
                files: vec!["src/**/*.ts".to_string()],
                related_rules: vec![],
            },
        );
        manifest.tasks.insert(
            task_id("bd-x1"),
            TaskEntry {
                status: TaskStatus::Open,
                created_at: None,
                updated_at: None,
                closed_at: None,
                spec: Some(spec_id("auth/login")),
                dependencies: vec![],
                related_rules: vec![],
            },
        );
        manifest.files.insert(
            "src/app/main.ts".to_string(),
            FileEntry {
                tasks: vec![task_id("bd-x1")],
                spec: None,
            },
        );
        manifest
    }

    #[tokio::test]
    async fn test_load_missing_is_default() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = Manifest::load_or_default(&temp.path().join("manifest.json"))
            .await
            .unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[tokio::test]
    async fn test_store_load_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("manifest.json");

        let mut manifest = sample_manifest();
        manifest.version = 3;
        manifest.store(&path).unwrap();

        let loaded = Manifest::load_or_default(&path).await.unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_store_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.json");
        let b = temp.path().join("b.json");

        sample_manifest().store(&a).unwrap();
        sample_manifest().store(&b).unwrap();

        assert_eq!(
            std::fs::read_to_string(a).unwrap(),
            std::fs::read_to_string(b).unwrap()
        );
    }

    #[test]
    fn test_remove_task_strips_references() {
        let mut manifest = sample_manifest();
        let warnings = manifest.remove_task(&task_id("bd-x1"));

        assert!(!manifest.tasks.contains_key(&task_id("bd-x1")));
        let spec = &manifest.specs[&spec_id("auth/login")];
        assert_eq!(spec.tasks, vec![task_id("bd-x2")]);
        assert!(manifest.files["src/app/main.ts"].tasks.is_empty());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_remove_spec_clears_references() {
        let mut manifest = sample_manifest();
        let warnings = manifest.remove_spec(&spec_id("auth/login"));

        assert!(manifest.specs.is_empty());
        assert_eq!(manifest.tasks[&task_id("bd-x1")].spec, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_lock_contention() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("manifest.json.lock");

        let held = ManifestLock::acquire(path.clone()).unwrap();
        let second = ManifestLock::acquire(path.clone());
        assert!(matches!(second, Err(CoordError::Concurrency(_))));

        drop(held);
        assert!(!path.exists());
        ManifestLock::acquire(path).unwrap();
    }
}
