//! Sandboxed removal of files, directories, and symbolic links.
//!
//! Removal is authorized only by the conjunction of the safe-prefix
//! gate and the ownership gate. A refused path is left untouched and
//! reported as false, never as an error; deleting the filesystem root
//! is refused unconditionally.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use cask_common::error::{CaskError, Result};

use crate::fileops::run_status;
use crate::sandbox::canonical_or_absolute;
use crate::session::FsSession;

/// Classification of a removal target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    File,
    Symlink,
    Directory,
}

impl PathKind {
    fn of(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }
}

/// Removes a single path, confined to the session's sandbox.
#[derive(Debug)]
pub struct SafeRemover<'s> {
    session: &'s FsSession,
    path: Option<PathBuf>,
}

impl<'s> SafeRemover<'s> {
    /// Binds a remover to `path`, resolved to lexical absolute form.
    #[must_use]
    pub fn new(session: &'s FsSession, path: impl AsRef<Path>) -> Self {
        Self {
            session,
            path: std::path::absolute(path.as_ref()).ok(),
        }
    }

    /// Deletes the bound path when, and only when, both authorization
    /// gates pass: the owning uid matches the configured sandbox uid,
    /// and the path lies under the configured temp directory or a
    /// registered safe prefix.
    ///
    /// Directories are removed through an external `rm -Rf` child whose
    /// exit status alone decides success; files and symlinks are
    /// unlinked directly. Refusals, missing paths, and OS-level
    /// failures all report false and leave the filesystem untouched.
    pub fn remove(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if canonical_or_absolute(path) == Path::new("/") {
            tracing::warn!(path = %path.display(), "refusing to remove the filesystem root");
            return false;
        }
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            tracing::debug!(path = %path.display(), "removal target does not exist");
            return false;
        };
        let config = self.session.config();
        let owner_ok = meta.uid() == config.uid;
        let sandboxed =
            path.starts_with(&config.tmpdir) || self.session.sandbox().is_safe(path);
        if !(owner_ok && sandboxed) {
            tracing::warn!(path = %path.display(), owner_ok, sandboxed, "removal refused");
            return false;
        }
        let result = match PathKind::of(meta.file_type()) {
            PathKind::Directory => remove_tree(path),
            PathKind::File | PathKind::Symlink => remove_entry(path),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "removal failed");
                false
            }
        }
    }
}

/// Recursive deletion through the external tool; success is defined as
/// a zero exit status, with no partial-deletion retry.
fn remove_tree(path: &Path) -> Result<()> {
    run_status("rm", &["-Rf", "--"], path)
}

/// Direct unlink of a file or symlink.
fn remove_entry(path: &Path) -> Result<()> {
    std::fs::remove_file(path).map_err(|e| CaskError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
