//! Common status types.

use serde::{Deserialize, Serialize};

/// Task lifecycle state, as recorded in the external task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Open and unclaimed.
    Open,
    /// Currently being worked on.
    InProgress,
    /// Blocked on another task.
    Blocked,
    /// Closed. Terminal: once a closure record exists, later updates
    /// cannot reopen the task.
    Closed,
}

impl TaskStatus {
    /// Is the task in a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Is the task open in any form (open, in progress, or blocked)?
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Open
    }
}

/// Spec document state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecStatus {
    /// Actively governing work.
    Active,
    /// Archived. The entry is retained (closed tasks may still reference
    /// it) but excluded from active queries.
    Archived,
}

impl SpecStatus {
    /// Lenient parse from frontmatter values.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "archived" | "archive" | "retired" => Self::Archived,
            _ => Self::Active,
        }
    }

    /// Is the spec active?
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Default for SpecStatus {
    fn default() -> Self {
        Self::Active
    }
}
