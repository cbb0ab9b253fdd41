//! Error taxonomy for the generation engine
//!
//! This module provides:
//! - Stable numeric error codes with categories for reporting
//! - The typed `EngineError` surfaced by tracker, guard and plugin operations
//! - `ProtectedFileWriteError`, the policy violation raised for manually owned files
//!
//! Recoverable conditions (missing or corrupt tracking documents, absent
//! extended properties) never reach this module; they are logged and degraded
//! to safe defaults at the call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// A caller passed an empty or otherwise unusable argument
    InvalidArgument = 1001,
    /// Configuration key or value rejected
    InvalidConfig = 1002,
    /// Write attempted against a manually owned file
    ProtectedFile = 2001,
    /// Write rejected by a guard other than file protection
    GuardRejected = 2002,
    /// Plugin initialized twice
    PluginAlreadyInitialized = 3001,
    /// Plugin name not known to the manager
    PluginNotFound = 3002,
    /// Plugin reported a failure from validation, init or shutdown
    PluginFailed = 3003,
    /// Filesystem operation failed
    IoError = 4001,
    /// Document could not be encoded or decoded
    SerializationError = 4002,
    /// Operation observed a cancellation signal
    Cancelled = 5001,
}

impl ErrorCode {
    /// Get the integer code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// No operation in this engine retries internally; retries belong to the
    /// schema introspection layer.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the error category for reporting
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument | ErrorCode::InvalidConfig => "contract_violation",
            ErrorCode::ProtectedFile | ErrorCode::GuardRejected => "policy_violation",
            ErrorCode::PluginAlreadyInitialized
            | ErrorCode::PluginNotFound
            | ErrorCode::PluginFailed => "plugin_error",
            ErrorCode::IoError | ErrorCode::SerializationError => "io_error",
            ErrorCode::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// PROTECTED FILE ERROR
// =============================================================================

/// Raised when a generator tries to overwrite a manually owned file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProtectedFileWriteError {
    /// The path exactly as the caller supplied it
    pub file_path: String,
    pub message: String,
}

impl ProtectedFileWriteError {
    pub fn new(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let message = format!(
            "Cannot overwrite protected file: {file_path}. \
             This file is marked as manually edited and must not be regenerated; \
             move custom code out of it or rename it to drop the protection marker."
        );
        Self { file_path, message }
    }
}

// =============================================================================
// ENGINE ERROR
// =============================================================================

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument '{parameter}': {reason}")]
    InvalidArgument {
        parameter: &'static str,
        reason: String,
    },

    #[error(transparent)]
    ProtectedFile(#[from] ProtectedFileWriteError),

    #[error("write to '{path}' rejected by guard '{guard}': {diagnostic}")]
    GuardRejected {
        guard: String,
        path: PathBuf,
        diagnostic: String,
    },

    #[error("plugin '{name}' is already initialized")]
    PluginAlreadyInitialized { name: String },

    #[error("plugin '{name}' not found")]
    PluginNotFound { name: String },

    #[error("plugin '{name}' failed: {message}")]
    PluginFailed { name: String, message: String },

    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: &'static str },

    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            EngineError::Config(_) => ErrorCode::InvalidConfig,
            EngineError::ProtectedFile(_) => ErrorCode::ProtectedFile,
            EngineError::GuardRejected { .. } => ErrorCode::GuardRejected,
            EngineError::PluginAlreadyInitialized { .. } => ErrorCode::PluginAlreadyInitialized,
            EngineError::PluginNotFound { .. } => ErrorCode::PluginNotFound,
            EngineError::PluginFailed { .. } => ErrorCode::PluginFailed,
            EngineError::Cancelled { .. } => ErrorCode::Cancelled,
            EngineError::Io { .. } => ErrorCode::IoError,
            EngineError::Serialization { .. } => ErrorCode::SerializationError,
        }
    }
}

/// Fails fast when a required string argument is empty or whitespace.
pub(crate) fn require_non_empty(parameter: &'static str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid_argument(
            parameter,
            "value must not be empty",
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
