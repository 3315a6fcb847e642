//! The synchronization engine.
//!
//! One-way projection of the task log and the spec tree into the manifest.
//! Single-writer: every pass takes the advisory lock, mutates a working
//! copy, and writes atomically — and only writes at all when the pass
//! actually changed something, which is what keeps re-runs byte-identical.

use crate::config::CoordConfig;
use crate::manifest::{Manifest, ManifestLock, SpecEntry, TaskEntry};
use crate::report::SyncReport;
use crate::spec_store::{read_spec_tree, SpecDoc};
use crate::task_store::{read_task_log, TaskState};
use crate::CoordError;
use guidepost_common_core::{SpecId, TaskId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Reconciles the external stores into the coordination manifest.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: CoordConfig,
}

impl SyncEngine {
    /// Create an engine over the given store locations.
    pub fn new(config: CoordConfig) -> Self {
        Self { config }
    }

    /// The store locations this engine reconciles.
    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    /// Project the task log into the manifest.
    pub async fn sync_tasks(&self) -> Result<SyncReport, CoordError> {
        let _lock = ManifestLock::acquire(self.config.lock_path())?;
        let mut manifest = Manifest::load_or_default(&self.config.manifest_path).await?;
        let before = manifest.clone();

        let view = read_task_log(&self.config.task_log).await?;
        let mut report = SyncReport {
            issues: view.issues,
            ..Default::default()
        };

        apply_tasks(&mut manifest, &view.tasks, &mut report);
        prune_references(&mut manifest, &mut report);
        self.finish(manifest, before, report)
    }

    /// Project the spec tree into the manifest.
    pub async fn sync_specs(&self) -> Result<SyncReport, CoordError> {
        let _lock = ManifestLock::acquire(self.config.lock_path())?;
        let mut manifest = Manifest::load_or_default(&self.config.manifest_path).await?;
        let before = manifest.clone();

        let view = read_spec_tree(&self.config.spec_root).await?;
        let mut report = SyncReport {
            issues: view.issues,
            ..Default::default()
        };

        apply_specs(&mut manifest, &view.specs, &mut report);
        prune_references(&mut manifest, &mut report);
        self.finish(manifest, before, report)
    }

    /// Full pass: both stores against one manifest snapshot, one write.
    ///
    /// Specs apply before tasks so a task tombstone strips the id from
    /// the freshly projected spec entries too.
    pub async fn sync_all(&self) -> Result<SyncReport, CoordError> {
        let _lock = ManifestLock::acquire(self.config.lock_path())?;
        let mut manifest = Manifest::load_or_default(&self.config.manifest_path).await?;
        let before = manifest.clone();

        let specs = read_spec_tree(&self.config.spec_root).await?;
        let tasks = read_task_log(&self.config.task_log).await?;
        let mut report = SyncReport::default();
        report.issues.extend(specs.issues);
        report.issues.extend(tasks.issues);

        apply_specs(&mut manifest, &specs.specs, &mut report);
        apply_tasks(&mut manifest, &tasks.tasks, &mut report);
        prune_references(&mut manifest, &mut report);
        self.finish(manifest, before, report)
    }

    /// Explicit manifest reset. The next sync rebuilds from scratch.
    pub async fn reset(&self) -> Result<(), CoordError> {
        let _lock = ManifestLock::acquire(self.config.lock_path())?;
        match tokio::fs::remove_file(&self.config.manifest_path).await {
            Ok(()) => {
                info!(path = %self.config.manifest_path.display(), "manifest reset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write only when the pass changed something; bump the version with
    /// the write. An unchanged manifest is left untouched on disk.
    fn finish(
        &self,
        mut manifest: Manifest,
        before: Manifest,
        mut report: SyncReport,
    ) -> Result<SyncReport, CoordError> {
        if manifest == before {
            report.changed = false;
            report.version = manifest.version;
            debug!("sync made no changes; manifest untouched");
            return Ok(report);
        }

        manifest.version += 1;
        manifest.store(&self.config.manifest_path)?;
        report.changed = true;
        report.version = manifest.version;
        info!(
            version = report.version,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            "manifest synchronized"
        );
        Ok(report)
    }
}

fn apply_tasks(
    manifest: &mut Manifest,
    tasks: &BTreeMap<TaskId, TaskState>,
    report: &mut SyncReport,
) {
    for (id, state) in tasks {
        let prev = manifest.tasks.get(id);
        let next = TaskEntry {
            status: state.status,
            created_at: state.created_at,
            updated_at: state.updated_at,
            closed_at: state.closed_at,
            spec: state.spec.clone(),
            dependencies: state.dependencies.clone(),
            // Manifest-only associations survive re-sync.
            related_rules: prev.map(|p| p.related_rules.clone()).unwrap_or_default(),
        };
        match prev {
            None => {
                manifest.tasks.insert(id.clone(), next);
                report.added += 1;
            }
            Some(existing) if *existing != next => {
                manifest.tasks.insert(id.clone(), next);
                report.updated += 1;
            }
            Some(_) => {}
        }
    }

    let stale: Vec<TaskId> = manifest
        .tasks
        .keys()
        .filter(|id| !tasks.contains_key(*id))
        .cloned()
        .collect();
    for id in stale {
        report
            .warnings
            .push(format!("tombstoned task {id}: no longer in task log"));
        report.warnings.extend(manifest.remove_task(&id));
        report.removed += 1;
    }
}

fn apply_specs(
    manifest: &mut Manifest,
    specs: &BTreeMap<SpecId, SpecDoc>,
    report: &mut SyncReport,
) {
    for (id, doc) in specs {
        let prev = manifest.specs.get(id);
        // Archival arrives here as a plain status change; the entry stays.
        let next = SpecEntry {
            status: doc.status,
            title: doc.title.clone(),
            path: doc.path.clone(),
            tasks: doc.tasks.clone(),
            files: doc.files.clone(),
            related_rules: prev.map(|p| p.related_rules.clone()).unwrap_or_default(),
        };
        match prev {
            None => {
                manifest.specs.insert(id.clone(), next);
                report.added += 1;
            }
            Some(existing) if *existing != next => {
                manifest.specs.insert(id.clone(), next);
                report.updated += 1;
            }
            Some(_) => {}
        }
    }

    let stale: Vec<SpecId> = manifest
        .specs
        .keys()
        .filter(|id| !specs.contains_key(*id))
        .cloned()
        .collect();
    for id in stale {
        report
            .warnings
            .push(format!("tombstoned spec {id}: no longer in spec tree"));
        report.warnings.extend(manifest.remove_spec(&id));
        report.removed += 1;
    }
}

/// Drop every manifest reference whose target is gone.
///
/// Each check is guarded on its target map being populated: validating
/// task references against a task map that has never been synced would
/// wrongly strip everything.
fn prune_references(manifest: &mut Manifest, report: &mut SyncReport) {
    let Manifest {
        specs,
        tasks,
        rules,
        files,
        ..
    } = manifest;

    if !specs.is_empty() {
        for (task_id, entry) in tasks.iter_mut() {
            if let Some(spec) = entry.spec.clone() {
                if !specs.contains_key(&spec) {
                    entry.spec = None;
                    report.warnings.push(format!(
                        "dropped unknown spec {spec} reference from task {task_id}"
                    ));
                }
            }
        }
        for (path, entry) in files.iter_mut() {
            if let Some(spec) = entry.spec.clone() {
                if !specs.contains_key(&spec) {
                    entry.spec = None;
                    report.warnings.push(format!(
                        "dropped unknown spec {spec} reference from file {path}"
                    ));
                }
            }
        }
    }

    if !tasks.is_empty() {
        for (spec_id, entry) in specs.iter_mut() {
            let before = entry.tasks.len();
            entry.tasks.retain(|t| tasks.contains_key(t));
            if entry.tasks.len() < before {
                report.warnings.push(format!(
                    "dropped {} unknown task reference(s) from spec {spec_id}",
                    before - entry.tasks.len()
                ));
            }
        }
        for (path, entry) in files.iter_mut() {
            let before = entry.tasks.len();
            entry.tasks.retain(|t| tasks.contains_key(t));
            if entry.tasks.len() < before {
                report.warnings.push(format!(
                    "dropped {} unknown task reference(s) from file {path}",
                    before - entry.tasks.len()
                ));
            }
        }
    }

    // Rule associations resolve against the manifest-owned rules map.
    if !rules.is_empty() {
        for (task_id, entry) in tasks.iter_mut() {
            let before = entry.related_rules.len();
            entry.related_rules.retain(|r| rules.contains_key(r));
            if entry.related_rules.len() < before {
                report.warnings.push(format!(
                    "dropped {} unknown rule reference(s) from task {task_id}",
                    before - entry.related_rules.len()
                ));
            }
        }
        for (spec_id, entry) in specs.iter_mut() {
            let before = entry.related_rules.len();
            entry.related_rules.retain(|r| rules.contains_key(r));
            if entry.related_rules.len() < before {
                report.warnings.push(format!(
                    "dropped {} unknown rule reference(s) from spec {spec_id}",
                    before - entry.related_rules.len()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidepost_common_core::{SpecStatus, TaskStatus};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> SyncEngine {
        let config = CoordConfig::resolve(temp.path());
        fs::create_dir_all(config.task_log.parent().unwrap()).unwrap();
        fs::create_dir_all(&config.spec_root).unwrap();
        SyncEngine::new(config)
    }

    fn write_tasks(engine: &SyncEngine, lines: &[&str]) {
        fs::write(&engine.config().task_log, lines.join("\n")).unwrap();
    }

    fn write_spec(engine: &SyncEngine, relative: &str, content: &str) {
        let path = engine.config().spec_root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn task_id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn spec_id(s: &str) -> SpecId {
        SpecId::parse(s).unwrap()
    }

    async fn manifest(engine: &SyncEngine) -> Manifest {
        Manifest::load_or_default(&engine.config().manifest_path)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_closure_wins_over_later_update() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(
            &engine,
            &[
                r#"{"id":"bd-x1","status":"open","created_at":"2026-01-01T00:00:00Z"}"#,
                r#"{"id":"bd-x1","status":"closed","closed_at":"2026-01-05T00:00:00Z"}"#,
            ],
        );

        let report = engine.sync_tasks().await.unwrap();
        assert_eq!(report.added, 1);
        assert!(report.changed);

        let manifest = manifest(&engine).await;
        let entry = &manifest.tasks[&task_id("bd-x1")];
        assert_eq!(entry.status, TaskStatus::Closed);
        assert!(entry.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_task_sync_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(
            &engine,
            &[
                r#"{"id":"bd-x1","status":"open"}"#,
                r#"{"id":"bd-x2","status":"in-progress"}"#,
            ],
        );

        let first = engine.sync_tasks().await.unwrap();
        assert!(first.changed);
        let bytes_after_first = fs::read(&engine.config().manifest_path).unwrap();

        let second = engine.sync_tasks().await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.version, first.version);
        let bytes_after_second = fs::read(&engine.config().manifest_path).unwrap();
        assert_eq!(bytes_after_first, bytes_after_second);
    }

    #[tokio::test]
    async fn test_tombstone_propagates_to_spec_task_lists() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_spec(
            &engine,
            "auth/login.md",
            "---\nstatus: active\ntasks:\n  - bd-x1\n  - bd-x2\n---\n",
        );
        write_tasks(
            &engine,
            &[
                r#"{"id":"bd-x1","status":"open"}"#,
                r#"{"id":"bd-x2","status":"open"}"#,
            ],
        );
        engine.sync_all().await.unwrap();

        // bd-x2 disappears from the log.
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);
        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.removed, 1);

        let manifest = manifest(&engine).await;
        assert!(!manifest.tasks.contains_key(&task_id("bd-x2")));
        assert_eq!(
            manifest.specs[&spec_id("auth/login")].tasks,
            vec![task_id("bd-x1")]
        );
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("tombstoned task bd-x2")));
    }

    #[tokio::test]
    async fn test_malformed_ids_never_reach_manifest() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(
            &engine,
            &[
                r#"{"id":"BD-123","status":"open"}"#,
                r#"{"id":"bd_123","status":"open"}"#,
                r#"{"id":"123-bd","status":"open"}"#,
            ],
        );

        let report = engine.sync_tasks().await.unwrap();
        assert_eq!(report.issues.len(), 3);

        let manifest = manifest(&engine).await;
        assert!(manifest.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_archival_retains_entry() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_spec(&engine, "flow.md", "---\nstatus: active\n---\n# Flow\n");
        engine.sync_specs().await.unwrap();

        write_spec(&engine, "flow.md", "---\nstatus: archived\n---\n# Flow\n");
        let report = engine.sync_specs().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 0);

        let manifest = manifest(&engine).await;
        assert_eq!(
            manifest.specs[&spec_id("flow")].status,
            SpecStatus::Archived
        );
    }

    #[tokio::test]
    async fn test_spec_tombstone_clears_task_references() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_spec(&engine, "flow.md", "---\nstatus: active\n---\n");
        write_tasks(
            &engine,
            &[r#"{"id":"bd-x1","status":"open","spec":"flow"}"#],
        );
        engine.sync_all().await.unwrap();

        fs::remove_file(engine.config().spec_root.join("flow.md")).unwrap();
        let report = engine.sync_all().await.unwrap();

        let manifest = manifest(&engine).await;
        assert!(manifest.specs.is_empty());
        assert_eq!(manifest.tasks[&task_id("bd-x1")].spec, None);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("tombstoned spec flow")));
    }

    #[tokio::test]
    async fn test_unknown_spec_reference_dropped_with_warning() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_spec(&engine, "real.md", "---\nstatus: active\n---\n");
        write_tasks(
            &engine,
            &[r#"{"id":"bd-x1","status":"open","spec":"ghost"}"#],
        );

        let report = engine.sync_all().await.unwrap();
        let manifest = manifest(&engine).await;
        assert_eq!(manifest.tasks[&task_id("bd-x1")].spec, None);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("dropped unknown spec ghost")));
    }

    #[tokio::test]
    async fn test_related_rules_preserved_across_resync() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);
        engine.sync_tasks().await.unwrap();

        // Manifest-only association added out of band.
        let mut m = manifest(&engine).await;
        m.tasks.get_mut(&task_id("bd-x1")).unwrap().related_rules =
            vec![guidepost_common_core::RuleId::parse("coding-standard/go/errors").unwrap()];
        m.version += 1;
        m.store(&engine.config().manifest_path).unwrap();

        write_tasks(
            &engine,
            &[
                r#"{"id":"bd-x1","status":"open"}"#,
                r#"{"id":"bd-x1","status":"in-progress"}"#,
            ],
        );
        engine.sync_tasks().await.unwrap();

        let m = manifest(&engine).await;
        let entry = &m.tasks[&task_id("bd-x1")];
        assert_eq!(entry.status, TaskStatus::InProgress);
        assert_eq!(entry.related_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_rule_references_pruned_against_registry() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);
        engine.sync_tasks().await.unwrap();

        // Populate the rule registry and attach one known and one
        // unknown rule to the task.
        let mut m = manifest(&engine).await;
        let known = guidepost_common_core::RuleId::parse("coding-standard/go/errors").unwrap();
        let stale = guidepost_common_core::RuleId::parse("coding-standard/go/removed").unwrap();
        m.rules.insert(
            known.clone(),
            crate::manifest::RuleEntry {
                module: "coding-standards/go".to_string(),
                path: "rules/errors.md".to_string(),
                description: None,
            },
        );
        m.tasks.get_mut(&task_id("bd-x1")).unwrap().related_rules =
            vec![known.clone(), stale];
        m.version += 1;
        m.store(&engine.config().manifest_path).unwrap();

        let report = engine.sync_tasks().await.unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("unknown rule reference")));

        let m = manifest(&engine).await;
        assert_eq!(m.tasks[&task_id("bd-x1")].related_rules, vec![known]);
    }

    #[tokio::test]
    async fn test_concurrent_sync_detected() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);

        let lock_path = engine.config().lock_path();
        fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        fs::write(&lock_path, "").unwrap();

        let result = engine.sync_tasks().await;
        assert!(matches!(result, Err(CoordError::Concurrency(_))));

        fs::remove_file(&lock_path).unwrap();
        engine.sync_tasks().await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_sync() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);

        engine.sync_tasks().await.unwrap();
        assert!(!engine.config().lock_path().exists());
    }

    #[tokio::test]
    async fn test_reset_then_rebuild() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        write_tasks(&engine, &[r#"{"id":"bd-x1","status":"open"}"#]);
        engine.sync_tasks().await.unwrap();
        assert!(engine.config().manifest_path.exists());

        engine.reset().await.unwrap();
        assert!(!engine.config().manifest_path.exists());

        let report = engine.sync_tasks().await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.version, 1);
    }

    #[tokio::test]
    async fn test_missing_task_log_is_hard_error() {
        let temp = TempDir::new().unwrap();
        let config = CoordConfig::resolve(temp.path());
        fs::create_dir_all(&config.spec_root).unwrap();
        let engine = SyncEngine::new(config);

        let result = engine.sync_tasks().await;
        assert!(matches!(result, Err(CoordError::Io(_))));
        // The failed pass must not leave the lock behind.
        assert!(!Path::new(&engine.config().lock_path()).exists());
    }
}
