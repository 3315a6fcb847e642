//! Reading the external spec document tree.
//!
//! Specs are markdown documents with leading YAML frontmatter. The id is
//! the path relative to the spec root without the `.md` extension. A
//! document is archived when its frontmatter says so or when it lives
//! under an `archive` directory — archival is a flag, not a deletion.

use crate::report::{SyncIssue, SyncIssueKind};
use crate::CoordError;
use guidepost_common_core::{SpecId, SpecStatus, TaskId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory names that mark their contents archived.
const ARCHIVE_DIRS: [&str; 2] = ["archive", "_archive"];

/// Parsed view of one spec document.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDoc {
    pub id: SpecId,
    pub status: SpecStatus,
    pub title: Option<String>,
    /// Path relative to the spec root.
    pub path: String,
    /// Related task ids from frontmatter.
    pub tasks: Vec<TaskId>,
    /// File glob patterns this spec governs.
    pub files: Vec<String>,
}

/// The parsed view of the whole spec tree.
#[derive(Debug, Default)]
pub struct SpecTreeView {
    pub specs: BTreeMap<SpecId, SpecDoc>,
    pub issues: Vec<SyncIssue>,
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tasks: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

/// Split a document into frontmatter and body.
///
/// Returns `Ok(None)` when the document has no frontmatter block, and an
/// error message when the block exists but does not parse.
fn parse_frontmatter(content: &str) -> Result<Option<Frontmatter>, String> {
    let mut lines = content.lines();
    match lines.next() {
        Some(line) if line.trim_end() == "---" => {}
        _ => return Ok(None),
    }

    let mut block = String::new();
    let mut closed = false;
    for line in lines {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        block.push_str(line);
        block.push('\n');
    }
    if !closed {
        return Err("unterminated frontmatter block".to_string());
    }

    serde_yaml::from_str(&block).map(Some).map_err(|e| e.to_string())
}

/// Title from the first markdown H1, for docs without a frontmatter title.
fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .take(10)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
}

fn is_archived_location(relative: &Path) -> bool {
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| ARCHIVE_DIRS.contains(&s))
            .unwrap_or(false)
    })
}

/// Walk the spec tree and parse every markdown document.
///
/// A missing root is a hard error; an individual document with broken
/// frontmatter is recorded and skipped.
pub async fn read_spec_tree(root: &Path) -> Result<SpecTreeView, CoordError> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("spec root not found: {}", root.display()),
        )
        .into());
    }

    let mut view = SpecTreeView::default();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if name.ends_with(".md") {
                read_document(root, &path, &mut view).await;
            }
        }
    }

    debug!(
        specs = view.specs.len(),
        issues = view.issues.len(),
        "spec tree read"
    );
    Ok(view)
}

async fn read_document(root: &Path, path: &Path, view: &mut SpecTreeView) {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => return,
    };
    let relative_str = relative
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/");

    let id_str = relative_str
        .strip_suffix(".md")
        .unwrap_or(&relative_str)
        .to_string();
    let id = match SpecId::parse(&id_str) {
        Ok(id) => id,
        Err(e) => {
            view.issues.push(SyncIssue {
                context: relative_str.clone(),
                kind: SyncIssueKind::Format,
                message: e.to_string(),
            });
            return;
        }
    };

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            view.issues.push(SyncIssue {
                context: relative_str.clone(),
                kind: SyncIssueKind::Format,
                message: format!("unreadable document: {e}"),
            });
            return;
        }
    };

    let frontmatter = match parse_frontmatter(&content) {
        Ok(frontmatter) => frontmatter.unwrap_or_default(),
        Err(e) => {
            view.issues.push(SyncIssue {
                context: relative_str.clone(),
                kind: SyncIssueKind::Format,
                message: format!("unparsable frontmatter: {e}"),
            });
            return;
        }
    };

    // Archived by location or by declared status.
    let status = if is_archived_location(&relative) {
        SpecStatus::Archived
    } else {
        frontmatter
            .status
            .as_deref()
            .map(SpecStatus::from_string)
            .unwrap_or_default()
    };

    let mut tasks = Vec::new();
    for raw in frontmatter.tasks {
        match TaskId::parse(&raw) {
            Ok(task) => tasks.push(task),
            Err(e) => view.issues.push(SyncIssue {
                context: relative_str.clone(),
                kind: SyncIssueKind::Format,
                message: e.to_string(),
            }),
        }
    }

    let title = frontmatter.title.or_else(|| extract_title(&content));

    view.specs.insert(
        id.clone(),
        SpecDoc {
            id,
            status,
            title,
            path: relative_str,
            tasks,
            files: frontmatter.files,
        },
    );
}
