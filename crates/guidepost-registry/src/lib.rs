//! Guidepost module registry.
//!
//! Discovery, validation and dependency resolution over a directory tree of
//! guidance modules and collections. Discovery is a pure function of a
//! directory snapshot: one broken module never aborts the pass, and only a
//! missing root surfaces as a hard error.

pub mod descriptor;
pub mod discovery;
pub mod resolve;
pub mod structure;
pub mod types;

pub use descriptor::{load_module, validate_metadata, ValidationReport, DESCRIPTOR_FILE};
pub use discovery::{
    discover_collections, discover_modules, CollectionDiscovery, DiscoveryIssue, IssueKind,
    ModuleDiscovery, ModuleIndex,
};
pub use resolve::{resolve_dependencies, ResolutionReport, ResolutionStatus, VersionConflict};
pub use structure::validate_structure;
pub use types::{Collection, Module, ModuleKind};

use std::path::PathBuf;

/// Registry errors. Item-level problems are reported as
/// [`DiscoveryIssue`]s, never through this enum.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The module root itself is missing. The one hard failure of a
    /// discovery pass.
    #[error("module root not found: {0}")]
    RootNotFound(PathBuf),

    /// I/O error at the top level of a discovery pass.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem helper error.
    #[error(transparent)]
    Fs(#[from] guidepost_common_fs::FsError),
}
