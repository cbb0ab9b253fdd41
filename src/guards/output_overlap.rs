//! W3: Output Overlap Guard
//!
//! Detects two artifacts in one batch targeting the same path.

use crate::guards::{Guard, GuardResult, WriteContext};
use std::collections::HashSet;

/// W3: Output Overlap Guard
pub struct OutputOverlapGuard;

impl Guard for OutputOverlapGuard {
    fn name(&self) -> &str {
        "W3: Output Overlap"
    }

    fn description(&self) -> &str {
        "Detects duplicate output paths across planned artifacts"
    }

    fn check(&self, ctx: &WriteContext) -> GuardResult {
        let mut seen_paths = HashSet::new();
        let mut duplicates = Vec::new();

        for write in &ctx.planned_writes {
            let resolved = ctx.resolve(&write.path);
            if !seen_paths.insert(resolved) {
                duplicates.push(write.path.display().to_string());
            }
        }

        if !duplicates.is_empty() {
            return GuardResult::fail_with_metadata(
                self.name(),
                format!("Duplicate output paths detected: {}", duplicates.join(", ")),
                "Ensure each table/artifact pair writes to a unique output path",
                vec![("duplicate_count", duplicates.len().to_string())],
            );
        }

        GuardResult::pass(
            self.name(),
            format!("No output conflicts: {} unique output paths", seen_paths.len()),
        )
    }
}
