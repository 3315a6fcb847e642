//! Reading the external task log.
//!
//! The log is append-only JSONL: one record per line, several records per
//! task id over its lifetime (creation, updates, closure). The reader
//! folds records into effective per-task state before anything is diffed
//! against the manifest — field-wise last-write-wins, with closure
//! terminal.

use crate::manifest::TaskEdge;
use crate::report::{SyncIssue, SyncIssueKind};
use crate::CoordError;
use chrono::{DateTime, Utc};
use guidepost_common_core::{SpecId, TaskId, TaskStatus};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One raw record from the task log. Only `id` is required; every other
/// field patches the task's effective state.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    /// Task id; validated against the `bd-` pattern at fold time.
    pub id: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Option<Vec<TaskEdge>>,
    #[serde(default)]
    pub spec: Option<String>,
}

/// Effective state of one task after folding its records.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub id: TaskId,
    pub status: TaskStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<TaskEdge>,
    pub spec: Option<SpecId>,
}

impl TaskState {
    fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::default(),
            created_at: None,
            updated_at: None,
            closed_at: None,
            dependencies: Vec::new(),
            spec: None,
        }
    }

    /// Patch this state with a later record. Fields absent from the
    /// record keep their current value.
    fn apply(&mut self, record: TaskRecord, issues: &mut Vec<SyncIssue>, context: &str) {
        if let Some(status) = record.status {
            self.status = status;
        }
        if record.created_at.is_some() {
            self.created_at = record.created_at;
        }
        if record.updated_at.is_some() {
            self.updated_at = record.updated_at;
        }
        if record.closed_at.is_some() {
            self.closed_at = record.closed_at;
        }
        if let Some(dependencies) = record.dependencies {
            self.dependencies = dependencies;
        }
        if let Some(spec) = record.spec {
            match SpecId::parse(&spec) {
                Ok(spec) => self.spec = Some(spec),
                Err(e) => issues.push(SyncIssue {
                    context: context.to_string(),
                    kind: SyncIssueKind::Format,
                    message: e.to_string(),
                }),
            }
        }
    }

    /// Closure is terminal: a `closed_at` anywhere in the history pins
    /// the folded status, whatever later records said.
    fn finalize(&mut self) {
        if self.closed_at.is_some() {
            self.status = TaskStatus::Closed;
        }
    }
}

/// The folded view of the task log.
#[derive(Debug, Default)]
pub struct TaskLogView {
    /// Effective state per task id.
    pub tasks: BTreeMap<TaskId, TaskState>,
    /// Records that were rejected, with why.
    pub issues: Vec<SyncIssue>,
}

/// Read and fold the task log.
///
/// A missing log file is a hard error — treating it as empty would
/// tombstone every task on the next sync. Individual malformed lines and
/// malformed ids are recorded and skipped.
pub async fn read_task_log(path: &Path) -> Result<TaskLogView, CoordError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let log_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let mut view = TaskLogView::default();

    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let context = format!("{}:{}", log_name, lineno + 1);

        let record: TaskRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                view.issues.push(SyncIssue {
                    context,
                    kind: SyncIssueKind::Format,
                    message: format!("unparsable record: {e}"),
                });
                continue;
            }
        };

        let id = match TaskId::parse(&record.id) {
            Ok(id) => id,
            Err(e) => {
                view.issues.push(SyncIssue {
                    context,
                    kind: SyncIssueKind::Format,
                    message: e.to_string(),
                });
                continue;
            }
        };

        view.tasks
            .entry(id.clone())
            .or_insert_with(|| TaskState::new(id))
            .apply(record, &mut view.issues, &context);
    }

    for state in view.tasks.values_mut() {
        state.finalize();
    }

    debug!(
        tasks = view.tasks.len(),
        issues = view.issues.len(),
        "task log folded"
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn fold(lines: &[&str]) -> TaskLogView {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.jsonl");
        fs::write(&path, lines.join("\n")).unwrap();
        read_task_log(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_fold_last_write_wins() {
        let view = fold(&[
            r#"{"id":"bd-x1","status":"open","created_at":"2026-01-01T00:00:00Z"}"#,
            r#"{"id":"bd-x1","status":"in-progress","updated_at":"2026-01-02T00:00:00Z"}"#,
        ])
        .await;

        let state = &view.tasks[&TaskId::parse("bd-x1").unwrap()];
        assert_eq!(state.status, TaskStatus::InProgress);
        assert!(state.created_at.is_some());
        assert!(state.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_closure_is_terminal() {
        let view = fold(&[
            r#"{"id":"bd-x1","status":"open"}"#,
            r#"{"id":"bd-x1","status":"closed","closed_at":"2026-01-03T00:00:00Z"}"#,
            r#"{"id":"bd-x1","status":"open","updated_at":"2026-01-04T00:00:00Z"}"#,
        ])
        .await;

        let state = &view.tasks[&TaskId::parse("bd-x1").unwrap()];
        assert_eq!(state.status, TaskStatus::Closed);
        assert!(state.closed_at.is_some());
        // The later update still lands on its own field.
        assert!(state.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_malformed_ids_rejected() {
        let view = fold(&[
            r#"{"id":"BD-123","status":"open"}"#,
            r#"{"id":"bd_123","status":"open"}"#,
            r#"{"id":"123-bd","status":"open"}"#,
            r#"{"id":"bd-ok","status":"open"}"#,
        ])
        .await;

        assert_eq!(view.tasks.len(), 1);
        assert!(view.tasks.contains_key(&TaskId::parse("bd-ok").unwrap()));
        assert_eq!(view.issues.len(), 3);
        assert!(view
            .issues
            .iter()
            .all(|i| i.kind == SyncIssueKind::Format));
    }

    #[tokio::test]
    async fn test_unparsable_line_skipped() {
        let view = fold(&[
            "not json at all",
            "",
            r#"{"id":"bd-ok"}"#,
        ])
        .await;

        assert_eq!(view.tasks.len(), 1);
        assert_eq!(view.issues.len(), 1);
        assert_eq!(view.issues[0].context, "tasks.jsonl:1");
    }

    #[tokio::test]
    async fn test_invalid_spec_reference_dropped() {
        let view = fold(&[r#"{"id":"bd-x1","spec":"/bad//spec"}"#]).await;
        let state = &view.tasks[&TaskId::parse("bd-x1").unwrap()];
        assert_eq!(state.spec, None);
        assert_eq!(view.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_log_is_hard_error() {
        let temp = TempDir::new().unwrap();
        let result = read_task_log(&temp.path().join("missing.jsonl")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dependencies_replace_not_merge() {
        let view = fold(&[
            r#"{"id":"bd-x1","dependencies":[{"id":"bd-a","kind":"blocks"},{"id":"bd-b","kind":"blocked-by"}]}"#,
            r#"{"id":"bd-x1","dependencies":[{"id":"bd-a","kind":"blocks"}]}"#,
        ])
        .await;

        let state = &view.tasks[&TaskId::parse("bd-x1").unwrap()];
        assert_eq!(state.dependencies.len(), 1);
        assert_eq!(state.dependencies[0].id, TaskId::parse("bd-a").unwrap());
    }
}
