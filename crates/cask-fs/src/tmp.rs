//! Temporary-path registry and umask bookkeeping.
//!
//! Every temp path minted by the filesystem layer is recorded here so a
//! single cleanup pass can delete whatever a run left behind. The saved
//! umask lives alongside it: the first call captures the pre-override
//! value and later calls keep handing that same value back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use nix::sys::stat::{self, Mode};

/// Session-wide registry of allocated temporary paths plus the
/// exactly-once saved umask.
#[derive(Debug, Default)]
pub struct TempRegistry {
    trash: Mutex<HashSet<PathBuf>>,
    saved_umask: Mutex<Option<Mode>>,
}

impl TempRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly minted temporary path for later cleanup.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let mut trash = self.trash.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = trash.insert(path.into());
    }

    /// Returns true when `path` is scheduled for cleanup.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.trash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// Number of paths awaiting cleanup.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when nothing is awaiting cleanup.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the registry, returning every registered path.
    pub fn drain(&self) -> Vec<PathBuf> {
        let mut trash = self.trash.lock().unwrap_or_else(PoisonError::into_inner);
        trash.drain().collect()
    }

    /// Applies `new_mask` when given and returns the umask captured on
    /// this registry's first call.
    ///
    /// The pre-override umask is saved exactly once; later overrides and
    /// plain queries keep returning that first captured value rather
    /// than re-capturing it.
    pub fn set_umask(&self, new_mask: Option<u32>) -> Option<u32> {
        let mut saved = self
            .saved_umask
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // umask(2) has no read-only query; probe by setting and restoring.
        let current = stat::umask(Mode::empty());
        let _ = stat::umask(current);
        if saved.is_none() {
            *saved = Some(current);
        }
        if let Some(mask) = new_mask {
            // only the permission bits are meaningful to umask(2)
            #[allow(clippy::cast_possible_truncation)]
            let mode = Mode::from_bits_truncate((mask & 0o7777) as _);
            let _ = stat::umask(mode);
        }
        saved.map(|mode| u32::from(mode.bits()))
    }
}
