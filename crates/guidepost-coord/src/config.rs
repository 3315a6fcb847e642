//! Coordination configuration.

use crate::CoordError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of the three stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordConfig {
    /// Append-only task log (JSONL).
    pub task_log: PathBuf,
    /// Root of the spec document tree.
    pub spec_root: PathBuf,
    /// The coordination manifest this core owns.
    pub manifest_path: PathBuf,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            task_log: PathBuf::from(".guidepost/tasks.jsonl"),
            spec_root: PathBuf::from("specs"),
            manifest_path: PathBuf::from(".guidepost/manifest.json"),
        }
    }
}

impl CoordConfig {
    /// Default store layout under a workspace root.
    pub fn resolve(workspace_root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            task_log: workspace_root.join(defaults.task_log),
            spec_root: workspace_root.join(defaults.spec_root),
            manifest_path: workspace_root.join(defaults.manifest_path),
        }
    }

    /// Load from a JSON config file.
    pub async fn load(path: &Path) -> Result<Self, CoordError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Advisory lock file path, next to the manifest.
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.manifest_path.clone();
        match path.file_name() {
            Some(name) => path.set_file_name(format!("{}.lock", name.to_string_lossy())),
            None => path.push(".lock"),
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_layout() {
        let config = CoordConfig::resolve(Path::new("/ws"));
        assert_eq!(config.task_log, Path::new("/ws/.guidepost/tasks.jsonl"));
        assert_eq!(config.spec_root, Path::new("/ws/specs"));
        assert_eq!(config.manifest_path, Path::new("/ws/.guidepost/manifest.json"));
    }

    #[test]
    fn test_lock_path() {
        let config = CoordConfig::resolve(Path::new("/ws"));
        assert_eq!(
            config.lock_path(),
            Path::new("/ws/.guidepost/manifest.json.lock")
        );
    }

    #[tokio::test]
    async fn test_load_partial_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("coord.json");
        std::fs::write(&path, r#"{"spec_root":"docs/specs"}"#).unwrap();

        let config = CoordConfig::load(&path).await.unwrap();
        assert_eq!(config.spec_root, Path::new("docs/specs"));
        assert_eq!(config.task_log, Path::new(".guidepost/tasks.jsonl"));
    }
}
