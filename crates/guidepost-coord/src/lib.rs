//! Coordination core: synchronization engine and query layer.
//!
//! Three independently-edited stores meet here. The task log and the spec
//! tree are externally owned and only read; the manifest is the one
//! artifact this crate owns and writes. Sync is a one-way projection into
//! the manifest, which is a materialized view that tolerates being rebuilt
//! from scratch at any time.

pub mod config;
pub mod manifest;
pub mod query;
pub mod report;
pub mod spec_store;
pub mod sync;
pub mod task_store;

pub use config::CoordConfig;
pub use manifest::{
    EdgeKind, FileEntry, Manifest, ManifestLock, RuleEntry, SpecEntry, TaskEdge, TaskEntry,
};
pub use query::{QueryError, QueryLayer};
pub use report::{SyncIssue, SyncIssueKind, SyncReport};
pub use spec_store::{read_spec_tree, SpecDoc, SpecTreeView};
pub use sync::SyncEngine;
pub use task_store::{read_task_log, TaskLogView, TaskRecord, TaskState};

use std::path::PathBuf;

/// Coordination errors.
///
/// Item-level problems (bad task ids, unparsable frontmatter, dangling
/// references) are carried in [`SyncReport`]s; this enum is for failures
/// of the pass itself.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// I/O failure at an expected top-level path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem helper failure.
    #[error(transparent)]
    Fs(#[from] guidepost_common_fs::FsError),

    /// Another sync holds the manifest lock.
    #[error("concurrent sync detected: lock file {0} exists")]
    Concurrency(PathBuf),
}
