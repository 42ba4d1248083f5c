//! Configuration model for the cask filesystem layer.
//!
//! Loading and parsing configuration files is the job of the outer
//! tooling; this crate only defines the model the filesystem layer reads.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration consumed by the filesystem-safety layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaskConfig {
    /// Directory where temporary files and directories are allocated.
    pub tmpdir: PathBuf,
    /// Uid the sandbox operates as; files owned by any other uid are
    /// never removed or rewritten.
    pub uid: u32,
}

impl Default for CaskConfig {
    fn default() -> Self {
        Self {
            tmpdir: std::env::temp_dir(),
            uid: nix::unistd::geteuid().as_raw(),
        }
    }
}
