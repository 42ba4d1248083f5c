//! Session state tying configuration to the sandbox registries.
//!
//! The safe-prefix set, temp trash, and saved umask are explicit state
//! owned by a session rather than process-wide globals, so several
//! sandboxes can coexist and be tested in isolation. Each registry
//! carries its own mutex for multi-threaded callers.

use std::path::Path;

use cask_common::config::CaskConfig;

use crate::remove::SafeRemover;
use crate::sandbox::PathSandbox;
use crate::tmp::TempRegistry;

/// One filesystem-safety session: configuration plus the safe-prefix
/// and temp registries consulted by every destructive operation.
#[derive(Debug, Default)]
pub struct FsSession {
    config: CaskConfig,
    sandbox: PathSandbox,
    tmp: TempRegistry,
}

impl FsSession {
    /// Creates a session from an explicit configuration.
    #[must_use]
    pub fn new(config: CaskConfig) -> Self {
        Self {
            config,
            sandbox: PathSandbox::new(),
            tmp: TempRegistry::new(),
        }
    }

    /// Configuration this session operates under.
    #[must_use]
    pub fn config(&self) -> &CaskConfig {
        &self.config
    }

    /// Safe-prefix registry gating destructive operations.
    #[must_use]
    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Temp-path registry drained by [`Self::cleanup`].
    #[must_use]
    pub fn tmp(&self) -> &TempRegistry {
        &self.tmp
    }

    /// Registers `prefix` as a safe root for destructive operations,
    /// e.g. when a container root directory is established.
    pub fn register_safe_prefix(&self, prefix: impl AsRef<Path>) {
        self.sandbox.register(prefix);
    }

    /// Applies `new_mask` when given and returns the umask captured on
    /// this session's first call; see [`TempRegistry::set_umask`].
    pub fn umask(&self, new_mask: Option<u32>) -> Option<u32> {
        self.tmp.set_umask(new_mask)
    }

    /// Removes every registered temp path, regardless of individual
    /// outcomes, and leaves the registry empty.
    ///
    /// Returns how many paths were actually deleted; entries that are
    /// already absent are not errors.
    pub fn cleanup(&self) -> usize {
        let paths = self.tmp.drain();
        let total = paths.len();
        let removed = paths
            .iter()
            .filter(|path| SafeRemover::new(self, path).remove())
            .count();
        tracing::info!(total, removed, "temp registry cleaned");
        removed
    }
}
