//! Module directory structure validation.

use crate::descriptor::{ValidationReport, DESCRIPTOR_FILE};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// README companion file name.
pub const README_FILE: &str = "README.md";

/// Rules directory name.
pub const RULES_DIR: &str = "rules";

/// Examples directory name.
pub const EXAMPLES_DIR: &str = "examples";

/// Validate the on-disk layout of a module directory.
///
/// Required: the descriptor file (parsable JSON) and a README. The rules
/// directory is required but may be empty (warning). The examples
/// directory is optional (warning when absent).
pub async fn validate_structure(dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    match fs::read_to_string(&descriptor_path).await {
        Err(_) => {
            report.error(format!("Missing required file: {DESCRIPTOR_FILE}"));
        }
        Ok(raw) => {
            if let Err(e) = serde_json::from_str::<Value>(&raw) {
                report.error(format!("Invalid JSON in {DESCRIPTOR_FILE}: {e}"));
            }
        }
    }

    if !dir.join(README_FILE).is_file() {
        report.error(format!("Missing required file: {README_FILE}"));
    }

    let rules_dir = dir.join(RULES_DIR);
    if !rules_dir.is_dir() {
        report.error(format!("Missing required directory: {RULES_DIR}"));
    } else {
        match count_entries(&rules_dir).await {
            Ok(0) => report.warning(format!("Directory '{RULES_DIR}' is empty")),
            Ok(_) => {}
            Err(e) => report.warning(format!("Could not read '{RULES_DIR}': {e}")),
        }
    }

    if !dir.join(EXAMPLES_DIR).is_dir() {
        report.warning(format!("Missing optional directory: {EXAMPLES_DIR}"));
    }

    report
}

async fn count_entries(dir: &Path) -> std::io::Result<usize> {
    let mut entries = fs::read_dir(dir).await?;
    let mut count = 0;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}
