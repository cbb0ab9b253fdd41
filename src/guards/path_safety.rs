//! W2: Path Safety Guard
//!
//! Prevents generators from writing outside the project root.

use crate::guards::{Guard, GuardResult, WriteContext};
use std::path::{Component, Path};

/// W2: Path Safety Guard
pub struct PathSafetyGuard;

/// Whether `path` stays inside `root` without resolving symlinks.
pub(crate) fn is_within_root(root: &Path, path: &Path) -> bool {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return false;
    }
    !path.is_absolute() || path.starts_with(root)
}

impl Guard for PathSafetyGuard {
    fn name(&self) -> &str {
        "W2: Path Safety"
    }

    fn description(&self) -> &str {
        "Validates all output paths stay inside the project root"
    }

    fn check(&self, ctx: &WriteContext) -> GuardResult {
        let unsafe_paths: Vec<String> = ctx
            .planned_writes
            .iter()
            .filter(|w| !is_within_root(&ctx.project_root, &w.path))
            .map(|w| w.path.display().to_string())
            .collect();

        if !unsafe_paths.is_empty() {
            return GuardResult::fail_with_metadata(
                self.name(),
                format!("Path traversal detected: {}", unsafe_paths.join(", ")),
                "Remove ../ segments and absolute paths outside the project root from artifact paths",
                vec![("unsafe_count", unsafe_paths.len().to_string())],
            );
        }

        GuardResult::pass(
            self.name(),
            format!("All paths safe: {} planned writes", ctx.planned_writes.len()),
        )
    }
}
