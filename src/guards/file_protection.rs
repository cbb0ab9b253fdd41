//! W1: Protected Files Guard
//!
//! A file is manually owned when its file name contains the `.prt.` marker,
//! ignoring case (`Invoice.prt.cs`, `Order.PRT.Generated.vb`). A name that
//! merely contains the letters (`InvoicePrt.cs`) is not protected.

use crate::error::ProtectedFileWriteError;
use crate::guards::{Guard, GuardResult, WriteContext};
use std::path::Path;

const PROTECTION_MARKER: &str = ".prt.";

/// A recognised marker/extension pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtectedPattern {
    pub marker: &'static str,
    pub extension: &'static str,
}

impl ProtectedPattern {
    /// Suffix form, e.g. `.prt.cs`
    pub fn suffix(&self) -> String {
        format!("{}.{}", self.marker, self.extension)
    }
}

const PROTECTED_PATTERNS: [ProtectedPattern; 2] = [
    ProtectedPattern {
        marker: ".prt",
        extension: "vb",
    },
    ProtectedPattern {
        marker: ".prt",
        extension: "cs",
    },
];

/// Owned copy of the recognised patterns; changing it has no effect on
/// protection checks.
pub fn protected_patterns() -> Vec<ProtectedPattern> {
    PROTECTED_PATTERNS.to_vec()
}

/// Whether `path` names a manually owned file. Empty or whitespace-only input
/// is never protected.
pub fn is_protected(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }

    // Either separator style may appear regardless of host platform.
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let file_name = file_name.to_ascii_lowercase();

    file_name.contains(PROTECTION_MARKER)
        || protected_patterns()
            .iter()
            .any(|pattern| file_name.ends_with(&pattern.suffix()))
}

pub fn is_protected_path(path: &Path) -> bool {
    is_protected(&path.to_string_lossy())
}

/// Fail with `ProtectedFileWriteError` when `path` is protected. No other
/// side effects.
pub fn ensure_not_protected(path: &str) -> Result<(), ProtectedFileWriteError> {
    if is_protected(path) {
        tracing::warn!(path, "rejected write to protected file");
        return Err(ProtectedFileWriteError::new(path));
    }
    Ok(())
}

/// W1: Protected Files Guard
pub struct FileProtectionGuard;

impl Guard for FileProtectionGuard {
    fn name(&self) -> &str {
        "W1: Protected Files"
    }

    fn description(&self) -> &str {
        "Rejects writes to manually owned files carrying the .prt. marker"
    }

    fn check(&self, ctx: &WriteContext) -> GuardResult {
        let protected: Vec<String> = ctx
            .planned_writes
            .iter()
            .filter(|w| is_protected_path(&w.path))
            .map(|w| w.path.display().to_string())
            .collect();

        if !protected.is_empty() {
            return GuardResult::fail_with_metadata(
                self.name(),
                format!("Protected files targeted: {}", protected.join(", ")),
                "Drop these artifacts from the batch and review the schema changes manually",
                vec![("protected_count", protected.len().to_string())],
            );
        }

        GuardResult::pass(
            self.name(),
            format!(
                "No protected files among {} planned writes",
                ctx.planned_writes.len()
            ),
        )
    }
}
