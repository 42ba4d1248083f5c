//! Symbolic-link virtualization for relocatable container trees.
//!
//! Absolute symlinks inside an unpacked root filesystem break as soon
//! as the tree is moved, copied to another host, or shared between
//! users — or worse, silently resolve into unrelated host paths. The
//! virtualizer rewrites link targets between two on-disk forms: the
//! plain host-absolute path and a location-independent form prefixed
//! with the `$CASK_ROOT` sentinel. These rewrites are the only code
//! paths that write either form.

use std::ffi::OsString;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use cask_common::constants::VIRTUAL_ROOT;
use cask_common::error::{CaskError, Result};
use nix::unistd::AccessFlags;

use crate::sandbox::canonical_or_absolute;
use crate::session::FsSession;

/// Direction of a tree-wide link conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// Host-absolute targets become sentinel-prefixed virtual targets.
    Virtualize,
    /// Sentinel-prefixed targets become host-absolute under the tree's
    /// current root.
    Restore,
}

/// Snapshot of one symbolic link taken during a tree walk.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    /// Directory the link lives in.
    pub dir: PathBuf,
    /// Base name of the link.
    pub name: OsString,
    /// Target string as stored on disk, unresolved.
    pub raw_target: PathBuf,
    /// Fully resolved absolute target, `None` when the link dangles.
    pub resolved: Option<PathBuf>,
    /// Uid owning the link itself.
    pub uid: u32,
}

impl LinkRecord {
    /// Reads a record for `path`; `None` when it is not a symbolic link.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let meta = std::fs::symlink_metadata(path).ok()?;
        if !meta.file_type().is_symlink() {
            return None;
        }
        Some(Self {
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name: path.file_name().map(OsString::from).unwrap_or_default(),
            raw_target: std::fs::read_link(path).ok()?,
            resolved: std::fs::canonicalize(path).ok(),
            uid: meta.uid(),
        })
    }

    /// Full path of the link.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Rewrites the symbolic links of one container tree between their
/// host-absolute and virtual forms.
#[derive(Debug)]
pub struct LinkVirtualizer<'s> {
    session: &'s FsSession,
    root: PathBuf,
}

impl<'s> LinkVirtualizer<'s> {
    /// Binds a virtualizer to the tree rooted at `root`, canonicalized
    /// when it exists.
    #[must_use]
    pub fn new(session: &'s FsSession, root: impl AsRef<Path>) -> Self {
        Self {
            session,
            root: canonical_or_absolute(root.as_ref()),
        }
    }

    /// Tree root this virtualizer operates on.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rewrites one link into the location-independent form.
    ///
    /// Succeeds for an absolute target resolving inside the tree and,
    /// under `force`, for one resolving outside it (re-encoded as the
    /// plain resolved host path). Relative, dangling, already-virtual,
    /// and root-degenerate targets are left untouched and reported as
    /// false.
    pub fn virtualize(&self, link: &Path, force: bool) -> bool {
        LinkRecord::read(link)
            .is_some_and(|record| self.convert(&record, LinkDirection::Virtualize, force))
    }

    /// Rewrites one link back to a host-absolute target under the
    /// tree's current root.
    ///
    /// A target already prefixed by the current root counts as success
    /// without modification (rewritten anyway under `force`); a target
    /// matching neither encoding is foreign and reported as false.
    pub fn restore(&self, link: &Path, force: bool) -> bool {
        LinkRecord::read(link)
            .is_some_and(|record| self.convert(&record, LinkDirection::Restore, force))
    }

    /// Converts every eligible symbolic link under the tree root.
    ///
    /// Returns `None` without touching the filesystem when the root is
    /// not under a registered safe prefix — "the operation did not run"
    /// as opposed to `Some` of an empty list, "it ran and converted
    /// nothing". Links owned by a uid other than the configured sandbox
    /// uid are skipped, and individual failures do not stop the walk.
    #[must_use]
    pub fn convert_tree(&self, direction: LinkDirection, force: bool) -> Option<Vec<PathBuf>> {
        if !self.session.sandbox().is_safe(&self.root) {
            tracing::warn!(root = %self.root.display(), "link conversion refused: tree is not sandboxed");
            return None;
        }
        let mut converted = Vec::new();
        self.walk(&self.root, direction, force, &mut converted);
        tracing::info!(
            root = %self.root.display(),
            count = converted.len(),
            ?direction,
            "tree links converted"
        );
        Some(converted)
    }

    /// Applies one conversion direction to a recorded link.
    fn convert(&self, record: &LinkRecord, direction: LinkDirection, force: bool) -> bool {
        match direction {
            LinkDirection::Virtualize => self.virtualize_record(record, force),
            LinkDirection::Restore => self.restore_record(record, force),
        }
    }

    fn virtualize_record(&self, record: &LinkRecord, force: bool) -> bool {
        let link = record.path();
        if record.raw_target.to_string_lossy().starts_with(VIRTUAL_ROOT) {
            // Already virtual, or the bare sentinel with nothing to encode.
            return false;
        }
        if !record.raw_target.is_absolute() {
            return false;
        }
        let Some(resolved) = &record.resolved else {
            tracing::debug!(link = %link.display(), "dangling target, not virtualized");
            return false;
        };
        if resolved == &self.root {
            // Degenerate: no suffix left to encode.
            return false;
        }
        if let Ok(suffix) = resolved.strip_prefix(&self.root) {
            let target = PathBuf::from(format!("{VIRTUAL_ROOT}/{}", suffix.display()));
            rewrite(&link, &target, force)
        } else if force {
            rewrite(&link, resolved, force)
        } else {
            tracing::debug!(
                link = %link.display(),
                target = %resolved.display(),
                "target outside tree, not virtualized"
            );
            false
        }
    }

    fn restore_record(&self, record: &LinkRecord, force: bool) -> bool {
        let link = record.path();
        let raw = record.raw_target.to_string_lossy();
        if let Some(suffix) = raw.strip_prefix(VIRTUAL_ROOT) {
            if !suffix.starts_with('/') || suffix.trim_start_matches('/').is_empty() {
                // Bare sentinel, or an unrelated name sharing the prefix.
                return false;
            }
            let target = self.root.join(suffix.trim_start_matches('/'));
            rewrite(&link, &target, force)
        } else if record.raw_target.starts_with(&self.root) {
            // Already host-absolute and consistent with the current root.
            if force {
                rewrite(&link, &record.raw_target, true)
            } else {
                true
            }
        } else {
            tracing::debug!(link = %link.display(), target = %raw, "unrecognized target, not restored");
            false
        }
    }

    /// Depth-first walk dispatching links and recursing into real
    /// directories only, so directory symlinks cannot induce cycles.
    fn walk(&self, dir: &Path, direction: LinkDirection, force: bool, converted: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "cannot read directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                let Some(record) = LinkRecord::read(&path) else {
                    continue;
                };
                if record.uid != self.session.config().uid {
                    tracing::debug!(link = %path.display(), uid = record.uid, "skipping foreign-owned link");
                    continue;
                }
                if self.convert(&record, direction, force) {
                    converted.push(path);
                }
            } else if file_type.is_dir() {
                self.walk(&path, direction, force, converted);
            }
        }
    }
}

/// Swaps the link on disk, logging the outcome.
fn rewrite(link: &Path, target: &Path, force: bool) -> bool {
    match replace_link(link, target, force) {
        Ok(()) => {
            tracing::debug!(link = %link.display(), target = %target.display(), "link rewritten");
            true
        }
        Err(e) => {
            tracing::warn!(link = %link.display(), error = %e, "link rewrite failed");
            false
        }
    }
}

/// Unlinks and re-creates `link` pointing at `target`.
///
/// With `force`, a non-writable parent directory is granted owner-write
/// for the duration of the swap and gets its original mode bits back
/// afterwards.
fn replace_link(link: &Path, target: &Path, force: bool) -> Result<()> {
    let parent = link.parent().ok_or_else(|| CaskError::Config {
        message: format!("link {} has no parent directory", link.display()),
    })?;
    let restore_mode = if force && nix::unistd::access(parent, AccessFlags::W_OK).is_err() {
        let mode = std::fs::metadata(parent)
            .map_err(|e| io_err(parent, e))?
            .permissions()
            .mode();
        set_mode(parent, mode | 0o200)?;
        Some(mode)
    } else {
        None
    };
    let swap = std::fs::remove_file(link)
        .and_then(|()| std::os::unix::fs::symlink(target, link))
        .map_err(|e| io_err(link, e));
    if let Some(mode) = restore_mode {
        set_mode(parent, mode)?;
    }
    swap
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, source: std::io::Error) -> CaskError {
    CaskError::Io {
        path: path.to_path_buf(),
        source,
    }
}
