//! Query layer over the coordination manifest.
//!
//! One cached view per layer instance, keyed on the manifest's version
//! counter. Any version change flushes the whole view — coarse, but
//! manifest writes are rare next to queries. The cold load parses the
//! manifest once; warm lookups run against `BTreeMap`s.

use crate::manifest::{Manifest, RuleEntry, SpecEntry};
use crate::CoordError;
use glob::{MatchOptions, Pattern};
use guidepost_common_core::{RuleId, SpecId, TaskId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Query failures.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The spec id is not in the manifest.
    #[error("spec not found: {0}")]
    SpecNotFound(SpecId),

    /// The task id is not in the manifest.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The rule id is not in the manifest's rule registry.
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// No active spec's file patterns match the path.
    #[error("no spec governs file: {0}")]
    NoSpecForFile(String),

    /// Loading the manifest failed.
    #[error(transparent)]
    Coord(#[from] CoordError),
}

/// Glob matching is path-aware: `*` never crosses a separator, `**` does.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

struct SpecPattern {
    spec: SpecId,
    pattern: Pattern,
    raw: String,
    /// Length of the literal prefix before the first wildcard; the
    /// specificity key for tie-breaking.
    literal_prefix: usize,
}

struct CachedView {
    version: u64,
    manifest: Manifest,
    /// Compiled patterns of active specs, in manifest order.
    patterns: Vec<SpecPattern>,
    /// Tasks grouped by their spec reference.
    tasks_by_spec: BTreeMap<SpecId, Vec<TaskId>>,
}

impl CachedView {
    fn build(manifest: Manifest) -> Self {
        let mut tasks_by_spec: BTreeMap<SpecId, Vec<TaskId>> = BTreeMap::new();
        for (task_id, entry) in &manifest.tasks {
            if let Some(spec) = &entry.spec {
                tasks_by_spec
                    .entry(spec.clone())
                    .or_default()
                    .push(task_id.clone());
            }
        }

        let mut patterns = Vec::new();
        for (spec_id, entry) in &manifest.specs {
            if !entry.status.is_active() {
                continue;
            }
            for raw in &entry.files {
                match Pattern::new(raw) {
                    Ok(pattern) => patterns.push(SpecPattern {
                        spec: spec_id.clone(),
                        literal_prefix: literal_prefix_len(raw),
                        raw: raw.clone(),
                        pattern,
                    }),
                    Err(e) => {
                        warn!(spec = %spec_id, pattern = %raw, error = %e, "skipping invalid file pattern");
                    }
                }
            }
        }

        debug!(
            version = manifest.version,
            patterns = patterns.len(),
            "query view built"
        );
        Self {
            version: manifest.version,
            manifest,
            patterns,
            tasks_by_spec,
        }
    }
}

fn literal_prefix_len(pattern: &str) -> usize {
    pattern
        .find(['*', '?', '['])
        .unwrap_or(pattern.len())
}

/// Cached, read-only view over the manifest file.
pub struct QueryLayer {
    manifest_path: PathBuf,
    cache: Option<CachedView>,
}

impl QueryLayer {
    /// A query layer over a manifest file. Nothing is read until the
    /// first query.
    pub fn new(manifest_path: PathBuf) -> Self {
        Self {
            manifest_path,
            cache: None,
        }
    }

    /// Re-read the manifest and rebuild the view if its version moved.
    pub async fn refresh(&mut self) -> Result<(), QueryError> {
        let manifest = Manifest::load_or_default(&self.manifest_path).await?;
        let stale = self
            .cache
            .as_ref()
            .map(|c| c.version != manifest.version)
            .unwrap_or(true);
        if stale {
            self.cache = Some(CachedView::build(manifest));
        }
        Ok(())
    }

    /// Drop the cached view; the next query reloads from disk.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Version of the cached view, when one is loaded.
    pub fn cached_version(&self) -> Option<u64> {
        self.cache.as_ref().map(|c| c.version)
    }

    async fn ensure_loaded(&mut self) -> Result<&CachedView, QueryError> {
        let view = match self.cache.take() {
            Some(view) => view,
            None => CachedView::build(Manifest::load_or_default(&self.manifest_path).await?),
        };
        Ok(self.cache.insert(view))
    }

    /// All specs with status `active`, in id order.
    pub async fn active_specs(&mut self) -> Result<Vec<(SpecId, SpecEntry)>, QueryError> {
        let view = self.ensure_loaded().await?;
        Ok(view
            .manifest
            .specs
            .iter()
            .filter(|(_, entry)| entry.status.is_active())
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect())
    }

    /// Tasks whose spec reference equals `spec_id`.
    pub async fn tasks_for_spec(&mut self, spec_id: &SpecId) -> Result<Vec<TaskId>, QueryError> {
        let view = self.ensure_loaded().await?;
        if !view.manifest.specs.contains_key(spec_id) {
            return Err(QueryError::SpecNotFound(spec_id.clone()));
        }
        Ok(view.tasks_by_spec.get(spec_id).cloned().unwrap_or_default())
    }

    /// Rules associated with a task: the task's own associations unioned
    /// with its spec's, deduplicated and sorted.
    pub async fn rules_for_task(&mut self, task_id: &TaskId) -> Result<Vec<RuleId>, QueryError> {
        let view = self.ensure_loaded().await?;
        let entry = view
            .manifest
            .tasks
            .get(task_id)
            .ok_or_else(|| QueryError::TaskNotFound(task_id.clone()))?;

        let mut rules: BTreeSet<RuleId> = entry.related_rules.iter().cloned().collect();
        if let Some(spec) = entry.spec.as_ref().and_then(|s| view.manifest.specs.get(s)) {
            rules.extend(spec.related_rules.iter().cloned());
        }
        Ok(rules.into_iter().collect())
    }

    /// Look up a rule in the manifest's rule registry.
    pub async fn rule_entry(&mut self, rule_id: &RuleId) -> Result<RuleEntry, QueryError> {
        let view = self.ensure_loaded().await?;
        view.manifest
            .rules
            .get(rule_id)
            .cloned()
            .ok_or_else(|| QueryError::RuleNotFound(rule_id.clone()))
    }

    /// The active spec governing a file path.
    ///
    /// When several specs match, the most specific pattern wins: longest
    /// literal prefix first, then longest pattern, then smallest spec id.
    pub async fn spec_for_file(&mut self, path: &str) -> Result<SpecId, QueryError> {
        let view = self.ensure_loaded().await?;
        let mut best: Option<&SpecPattern> = None;

        for candidate in &view.patterns {
            if !candidate.pattern.matches_with(path, MATCH_OPTIONS) {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    let candidate_key = (candidate.literal_prefix, candidate.raw.len());
                    let current_key = (current.literal_prefix, current.raw.len());
                    if candidate_key > current_key
                        || (candidate_key == current_key && candidate.spec < current.spec)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best.map(|p| p.spec.clone())
            .ok_or_else(|| QueryError::NoSpecForFile(path.to_string()))
    }

    /// Duplicate-free union of tasks directly associated with the path
    /// and tasks associated via the governing spec.
    pub async fn tasks_for_file(&mut self, path: &str) -> Result<Vec<TaskId>, QueryError> {
        let spec = match self.spec_for_file(path).await {
            Ok(spec) => Some(spec),
            Err(QueryError::NoSpecForFile(_)) => None,
            Err(e) => return Err(e),
        };

        let view = self.ensure_loaded().await?;
        let mut tasks: BTreeSet<TaskId> = view
            .manifest
            .files
            .get(path)
            .map(|entry| entry.tasks.iter().cloned().collect())
            .unwrap_or_default();

        if let Some(spec) = spec {
            if let Some(by_ref) = view.tasks_by_spec.get(&spec) {
                tasks.extend(by_ref.iter().cloned());
            }
            if let Some(entry) = view.manifest.specs.get(&spec) {
                tasks.extend(entry.tasks.iter().cloned());
            }
        }

        Ok(tasks.into_iter().collect())
    }
}
