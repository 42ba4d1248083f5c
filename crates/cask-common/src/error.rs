//! Unified error types for the cask workspace.
//!
//! Public operations of the filesystem-safety core report success as
//! booleans, options, or lists; these variants are the currency of the
//! internal fallible helpers whose failures are logged and converted at
//! the public boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CaskError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A permission or ownership error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// An external command exited with a non-zero status.
    #[error("external command {command} failed with status {status}")]
    External {
        /// Command line that was invoked.
        command: String,
        /// Exit status reported by the child, -1 when killed by signal.
        status: i32,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CaskError>;
