//! Core types shared across the Guidepost workspace.
//!
//! Identifiers and status enums used by the registry and the coordination
//! engine. Everything here is plain data: no I/O, no async.

pub mod id;
pub mod status;

pub use id::{IdError, ModuleId, RuleId, SpecId, TaskId};
pub use status::{SpecStatus, TaskStatus};
