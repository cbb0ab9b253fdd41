//! Write guards for generated artifacts
//!
//! Every batch of planned writes passes through a `GuardKernel` before any
//! external generator may touch disk:
//! - **Protected Files** - Never overwrite manually owned (`.prt.`) files
//! - **Path Safety** - Keep every output inside the project root
//! - **Output Overlap** - Detect two artifacts targeting the same path
//!
//! ## Usage
//! ```rust,ignore
//! use targcc_engine::guards::{GuardKernel, PlannedWrite, WriteContext};
//!
//! let ctx = WriteContext::new(project_root, planned_writes);
//! let results = GuardKernel::default_suite().evaluate(&ctx);
//! if !results.all_passed() {
//!     eprintln!("{}", results.remediation_summary());
//! }
//! ```

pub mod file_protection;
pub mod output_overlap;
pub mod path_safety;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use file_protection::{
    FileProtectionGuard, ProtectedPattern, ensure_not_protected, is_protected, is_protected_path,
    protected_patterns,
};
pub use output_overlap::OutputOverlapGuard;
pub use path_safety::PathSafetyGuard;

// =============================================================================
// Core Guard Trait
// =============================================================================

/// Guard trait - each guard implements one check over a batch of writes
pub trait Guard: Send + Sync {
    /// Guard identifier (e.g., "W1: Protected Files")
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Execute the guard check
    fn check(&self, ctx: &WriteContext) -> GuardResult;
}

// =============================================================================
// Guard Result Types
// =============================================================================

/// Result of a guard check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResult {
    pub guard_name: String,
    pub verdict: Verdict,
    /// Diagnostic message explaining the result
    pub diagnostic: String,
    /// Remediation steps if failed
    pub remediation: String,
    /// Offending paths, counts and similar details
    pub metadata: HashMap<String, String>,
}

impl GuardResult {
    /// Create a passing result
    pub fn pass(guard_name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            guard_name: guard_name.into(),
            verdict: Verdict::Pass,
            diagnostic: diagnostic.into(),
            remediation: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a failing result with metadata
    pub fn fail_with_metadata(
        guard_name: impl Into<String>,
        diagnostic: impl Into<String>,
        remediation: impl Into<String>,
        metadata: Vec<(&str, String)>,
    ) -> Self {
        Self {
            guard_name: guard_name.into(),
            verdict: Verdict::Fail,
            diagnostic: diagnostic.into(),
            remediation: remediation.into(),
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.verdict, Verdict::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self.verdict, Verdict::Fail)
    }
}

/// Guard verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

// =============================================================================
// Write Context (Input to Guards)
// =============================================================================

/// One artifact a generator intends to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub table_name: String,
    pub artifact_type: String,
    pub path: PathBuf,
}

impl PlannedWrite {
    pub fn new(
        table_name: impl Into<String>,
        artifact_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            artifact_type: artifact_type.into(),
            path: path.into(),
        }
    }
}

/// A batch of planned writes rooted at a project directory
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub project_root: PathBuf,
    pub planned_writes: Vec<PlannedWrite>,
}

impl WriteContext {
    pub fn new(project_root: impl Into<PathBuf>, planned_writes: Vec<PlannedWrite>) -> Self {
        Self {
            project_root: project_root.into(),
            planned_writes,
        }
    }

    /// Resolve a planned path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

// =============================================================================
// Guard Kernel (Orchestrator)
// =============================================================================

/// Guard kernel - orchestrates all write guards
pub struct GuardKernel {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardKernel {
    pub fn new(guards: Vec<Box<dyn Guard>>) -> Self {
        Self { guards }
    }

    /// Protected files, path safety and output overlap, in that order
    pub fn default_suite() -> Self {
        Self {
            guards: vec![
                Box::new(FileProtectionGuard),
                Box::new(PathSafetyGuard),
                Box::new(OutputOverlapGuard),
            ],
        }
    }

    /// Evaluate all guards against the write context
    pub fn evaluate(&self, ctx: &WriteContext) -> GuardResults {
        let results: Vec<GuardResult> = self.guards.iter().map(|g| g.check(ctx)).collect();
        for failure in results.iter().filter(|r| r.is_fail()) {
            tracing::warn!(
                guard = %failure.guard_name,
                diagnostic = %failure.diagnostic,
                "write guard failed"
            );
        }
        GuardResults { results }
    }

    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }
}

impl Default for GuardKernel {
    fn default() -> Self {
        Self::default_suite()
    }
}

// =============================================================================
// Guard Results Collection
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResults {
    pub results: Vec<GuardResult>,
}

impl GuardResults {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.is_pass())
    }

    pub fn failures(&self) -> Vec<&GuardResult> {
        self.results.iter().filter(|r| r.is_fail()).collect()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().len()
    }

    /// Generate remediation summary
    pub fn remediation_summary(&self) -> String {
        let failures = self.failures();
        if failures.is_empty() {
            return "All guards passed.".to_string();
        }

        let mut summary = format!("{} guard(s) failed:\n", failures.len());
        for (i, failure) in failures.iter().enumerate() {
            summary.push_str(&format!(
                "{}. {} - {}\n   Remediation: {}\n",
                i + 1,
                failure.guard_name,
                failure.diagnostic,
                failure.remediation
            ));
        }
        summary
    }
}

// =============================================================================
// Tests
// =============================================================================
