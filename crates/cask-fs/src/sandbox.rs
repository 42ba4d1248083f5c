//! Safe-prefix registry gating destructive filesystem operations.
//!
//! Deletion and link rewriting are confined to an explicit allow-list of
//! root directories. The registry fails closed: until a matching prefix
//! has been registered, nothing is considered safe.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Registry of absolute path prefixes approved for destructive
/// operations.
#[derive(Debug, Default)]
pub struct PathSandbox {
    prefixes: Mutex<Vec<PathBuf>>,
}

impl PathSandbox {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path prefix as safe, e.g. when a container root
    /// directory is established.
    ///
    /// The prefix is canonicalized when it exists on disk; registering
    /// the same prefix twice is a no-op.
    pub fn register(&self, prefix: impl AsRef<Path>) {
        let normalized = canonical_or_absolute(prefix.as_ref());
        let mut prefixes = self.prefixes.lock().unwrap_or_else(PoisonError::into_inner);
        if !prefixes.contains(&normalized) {
            prefixes.push(normalized);
        }
    }

    /// Returns true iff the canonical absolute form of `path` lies under
    /// at least one registered prefix.
    ///
    /// Matching is component-wise, so `/tmp/safe-other` is not under
    /// `/tmp/safe`. Performs no I/O side effects.
    #[must_use]
    pub fn is_safe(&self, path: &Path) -> bool {
        let resolved = canonical_or_absolute(path);
        let prefixes = self.prefixes.lock().unwrap_or_else(PoisonError::into_inner);
        prefixes.iter().any(|prefix| resolved.starts_with(prefix))
    }

    /// Number of registered prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when no prefix has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves `path` through symlinks when possible, falling back to a
/// lexical absolute form for paths that do not exist yet.
pub(crate) fn canonical_or_absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_rejects_everything() {
        let sandbox = PathSandbox::new();
        assert!(sandbox.is_empty());
        assert!(!sandbox.is_safe(Path::new("/tmp")));
        assert!(!sandbox.is_safe(Path::new("/")));
    }

    #[test]
    fn registered_prefix_covers_descendants() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = PathSandbox::new();
        sandbox.register(dir.path());
        assert!(sandbox.is_safe(dir.path()));
        assert!(sandbox.is_safe(&dir.path().join("a/b/c")));
    }

    #[test]
    fn sibling_with_shared_name_prefix_is_not_safe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("safe");
        std::fs::create_dir(&root).expect("mkdir");
        let sandbox = PathSandbox::new();
        sandbox.register(&root);
        assert!(sandbox.is_safe(&root.join("inside")));
        assert!(!sandbox.is_safe(&dir.path().join("safe-other/inside")));
    }

    #[test]
    fn register_is_idempotent() {
        let sandbox = PathSandbox::new();
        sandbox.register("/srv/containers");
        sandbox.register("/srv/containers");
        assert_eq!(sandbox.len(), 1);
    }
}
