//! File system utilities for Guidepost.
//!
//! The one operation that matters here is [`write_atomic`]: every manifest
//! write goes through it so a concurrent reader never observes a partially
//! written file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filesystem error with path context.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Read failure.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Write failure.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for filesystem operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// Write to a file atomically: write to a sibling temp file, sync, rename.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new("."));

    fs::create_dir_all(parent).map_err(|e| FsError::Write {
        path: parent.to_path_buf(),
        source: e,
    })?;

    // Temp file must live in the same directory as the target so the
    // rename stays on one filesystem.
    let mut temp_path = path.to_path_buf();
    match path.file_name() {
        Some(name) => temp_path.set_file_name(format!(".{}.tmp", name.to_string_lossy())),
        None => temp_path.push(".tmp"),
    }

    {
        let mut file = File::create(&temp_path).map_err(|e| FsError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(contents).map_err(|e| FsError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        file.sync_all().map_err(|e| FsError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        FsError::Write {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Write a string to a file atomically.
pub fn write_string_atomic(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    write_atomic(path, contents.as_bytes())
}

/// Ensure a directory exists.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| FsError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// List regular files directly under a directory.
pub fn list_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    list_entries(dir.as_ref(), |p| p.is_file())
}

/// List directories directly under a directory.
pub fn list_dirs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    list_entries(dir.as_ref(), |p| p.is_dir())
}

fn list_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let read_dir = fs::read_dir(dir).map_err(|e| FsError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| FsError::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if keep(&path) {
            out.push(path);
        }
    }

    // Deterministic ordering for callers that diff their results.
    out.sort();
    Ok(out)
}
