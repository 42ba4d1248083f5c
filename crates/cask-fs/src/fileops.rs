//! Per-path file operations bound to a sandbox session.
//!
//! A [`FileHandle`] is the unit of work of the filesystem layer:
//! construct one per operation, call the operation, drop it. Every
//! public method reports failure as a boolean, option, or empty string
//! rather than an error; callers must check the result.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use cask_common::config::CaskConfig;
use cask_common::constants::TMP_PREFIX;
use cask_common::error::{CaskError, Result};

use crate::session::FsSession;

/// Per-path operations on one file, directory, or symlink.
#[derive(Debug)]
pub struct FileHandle<'s> {
    session: &'s FsSession,
    path: Option<PathBuf>,
}

impl<'s> FileHandle<'s> {
    /// Binds a handle to `path`, resolved to lexical absolute form at
    /// construction time.
    ///
    /// An empty path yields the no-op state: every operation fails
    /// cleanly without touching the filesystem.
    #[must_use]
    pub fn new(session: &'s FsSession, path: impl AsRef<Path>) -> Self {
        Self {
            session,
            path: std::path::absolute(path.as_ref()).ok(),
        }
    }

    /// Creates a handle in the no-op state.
    #[must_use]
    pub fn unbound(session: &'s FsSession) -> Self {
        Self {
            session,
            path: None,
        }
    }

    /// Absolute path this handle operates on, when bound.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn config(&self) -> &CaskConfig {
        self.session.config()
    }

    /// Returns true when the path exists, following symlinks.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.exists())
    }

    /// Returns true when the path is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.is_dir())
    }

    /// Returns true when the path is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.is_file())
    }

    /// Returns true when the path itself is a symbolic link.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.path
            .as_ref()
            .and_then(|p| std::fs::symlink_metadata(p).ok())
            .is_some_and(|meta| meta.file_type().is_symlink())
    }

    /// Size in bytes, `None` when the path cannot be stat'ed.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        std::fs::metadata(self.path.as_ref()?)
            .ok()
            .map(|meta| meta.len())
    }

    /// Owning uid of the path itself; symlinks are not followed.
    #[must_use]
    pub fn uid(&self) -> Option<u32> {
        std::fs::symlink_metadata(self.path.as_ref()?)
            .ok()
            .map(|meta| meta.uid())
    }

    /// Reads the whole file as UTF-8, `None` on any error.
    #[must_use]
    pub fn getdata(&self) -> Option<String> {
        std::fs::read_to_string(self.path.as_ref()?).ok()
    }

    /// Overwrites the file with `data`; true on success.
    pub fn putdata(&self, data: &str) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        match std::fs::write(path, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "putdata failed");
                false
            }
        }
    }

    /// Copies the file's contents to `dest`, truncating it or appending
    /// to it; true on success.
    pub fn copy_to(&self, dest: &Path, append: bool) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let mut options = std::fs::OpenOptions::new();
        let _ = options.create(true);
        if append {
            let _ = options.append(true);
        } else {
            let _ = options.write(true).truncate(true);
        }
        let result = std::fs::File::open(path).and_then(|mut src| {
            options
                .open(dest)
                .and_then(|mut dst| std::io::copy(&mut src, &mut dst))
        });
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(src = %path.display(), dest = %dest.display(), error = %e, "copy failed");
                false
            }
        }
    }

    /// Renames the path to `new_path`; true on success.
    pub fn rename(&self, new_path: &Path) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        match std::fs::rename(path, new_path) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "rename failed");
                false
            }
        }
    }

    /// Creates the directory and any missing parents.
    ///
    /// A pre-existing directory and any other creation error both
    /// report success: directory creation is idempotent here, never
    /// fatal.
    pub fn mkdir(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if let Err(e) = std::fs::create_dir_all(path) {
            tracing::debug!(path = %path.display(), error = %e, "mkdir error ignored");
        }
        true
    }

    /// Mints a fresh temporary path under the configured temp directory
    /// and registers it for cleanup before returning it.
    ///
    /// The name combines an opaque token with the handle's basename:
    /// `<tmpdir>/cask-<token>-<basename>`.
    pub fn mktmp(&self) -> Option<PathBuf> {
        let base = self.path.as_ref()?.file_name()?.to_string_lossy();
        let token = uuid::Uuid::new_v4().simple();
        let tmp = self
            .config()
            .tmpdir
            .join(format!("{TMP_PREFIX}-{token}-{base}"));
        self.session.tmp().register(tmp.clone());
        Some(tmp)
    }

    /// Creates a directory at a fresh [`Self::mktmp`] path; `None` when
    /// creation fails.
    pub fn mktmpdir(&self) -> Option<PathBuf> {
        let tmp = self.mktmp()?;
        match std::fs::create_dir_all(&tmp) {
            Ok(()) => Some(tmp),
            Err(e) => {
                tracing::debug!(path = %tmp.display(), error = %e, "mktmpdir failed");
                None
            }
        }
    }

    /// Checks archive integrity by listing it with the external `tar`
    /// tool; true iff the path is a file and the child exits zero.
    ///
    /// Only the exit status is inspected; the child's output is
    /// discarded. The call blocks until the child exits.
    pub fn verify_tar(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if !path.is_file() {
            return false;
        }
        match run_status("tar", &["-t", "-f"], path) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "tar verification failed");
                false
            }
        }
    }

    /// Locates the handle's basename as an executable on the system
    /// search path; empty string when not found.
    #[must_use]
    pub fn find_exec(&self) -> String {
        let Some(name) = self.path.as_ref().and_then(|p| p.file_name()) else {
            return String::new();
        };
        which::which(name).map_or_else(|_| String::new(), |p| p.display().to_string())
    }

    /// Looks for the handle's basename in a colon-delimited search path.
    ///
    /// Accepts either a raw list (`/bin:/usr/bin`) or an
    /// assignment-shaped string (`PATH=/bin:/usr/bin`); the candidate
    /// check does not follow symlinks. Empty string when not found.
    #[must_use]
    pub fn find_inpath(&self, path_spec: &str) -> String {
        let Some(name) = self.path.as_ref().and_then(|p| p.file_name()) else {
            return String::new();
        };
        let list = path_spec.split_once('=').map_or(path_spec, |(_, v)| v);
        for dir in list.split(':').filter(|d| !d.is_empty()) {
            let candidate = Path::new(dir).join(name);
            if std::fs::symlink_metadata(&candidate).is_ok() {
                return candidate.display().to_string();
            }
        }
        String::new()
    }

    /// Returns the first of `candidates` that exists inside the handle's
    /// directory; empty string when none do.
    #[must_use]
    pub fn find_file_in_dir(&self, candidates: &[&str]) -> String {
        let Some(dir) = &self.path else {
            return String::new();
        };
        for name in candidates {
            let candidate = dir.join(name);
            if candidate.exists() {
                return candidate.display().to_string();
            }
        }
        String::new()
    }
}

/// Runs `program` with `args` plus the target path, discarding all
/// output; success is defined by the exit status alone.
pub(crate) fn run_status(program: &str, args: &[&str], path: &Path) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| CaskError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(CaskError::External {
            command: format!("{program} {} {}", args.join(" "), path.display()),
            status: status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(tmpdir: &Path) -> FsSession {
        FsSession::new(CaskConfig {
            tmpdir: tmpdir.to_path_buf(),
            ..CaskConfig::default()
        })
    }

    #[test]
    fn unbound_handle_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let handle = FileHandle::unbound(&session);
        assert!(handle.path().is_none());
        assert!(!handle.exists());
        assert!(!handle.putdata("x"));
        assert!(handle.mktmp().is_none());
        assert_eq!(handle.find_exec(), "");
    }

    #[test]
    fn empty_path_collapses_to_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let handle = FileHandle::new(&session, "");
        assert!(handle.path().is_none());
    }

    #[test]
    fn mktmp_names_are_unique_and_registered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let handle = FileHandle::new(&session, "layer.tar");

        let a = handle.mktmp().expect("mktmp");
        let b = handle.mktmp().expect("mktmp");
        assert_ne!(a, b);
        assert!(session.tmp().contains(&a));
        assert!(session.tmp().contains(&b));

        let name = a.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("{TMP_PREFIX}-")));
        assert!(name.ends_with("-layer.tar"));
        assert!(a.starts_with(dir.path()));
    }

    #[test]
    fn mktmpdir_creates_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let tmp = FileHandle::new(&session, "scratch")
            .mktmpdir()
            .expect("mktmpdir");
        assert!(tmp.is_dir());
    }

    #[test]
    fn mkdir_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let handle = FileHandle::new(&session, dir.path().join("a/b/c"));
        assert!(handle.mkdir());
        assert!(handle.is_dir());
        assert!(handle.mkdir(), "second creation must also succeed");
    }

    #[test]
    fn putdata_getdata_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let path = dir.path().join("notes.txt");
        let handle = FileHandle::new(&session, &path);

        assert!(handle.putdata("qwerty"));
        assert_eq!(handle.getdata().as_deref(), Some("qwerty"));
        assert_eq!(handle.size(), Some(6));
    }

    #[test]
    fn getdata_on_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let handle = FileHandle::new(&session, dir.path().join("missing.txt"));
        assert!(handle.getdata().is_none());
        assert!(handle.size().is_none());
    }

    #[test]
    fn copy_to_truncates_and_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        std::fs::write(&src, "data").expect("write");
        std::fs::write(&dest, "old contents").expect("write");

        let handle = FileHandle::new(&session, &src);
        assert!(handle.copy_to(&dest, false));
        assert_eq!(std::fs::read_to_string(&dest).expect("read"), "data");

        assert!(handle.copy_to(&dest, true));
        assert_eq!(std::fs::read_to_string(&dest).expect("read"), "datadata");
    }

    #[test]
    fn rename_moves_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        std::fs::write(&old, "x").expect("write");

        assert!(FileHandle::new(&session, &old).rename(&new));
        assert!(!old.exists());
        assert!(new.exists());
    }

    #[test]
    fn uid_reports_the_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let path = dir.path().join("owned.txt");
        std::fs::write(&path, "x").expect("write");

        let uid = FileHandle::new(&session, &path).uid().expect("uid");
        assert_eq!(uid, nix::unistd::geteuid().as_raw());
    }

    #[test]
    fn find_inpath_scans_the_colon_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).expect("mkdir");
        std::fs::write(bin.join("exec"), "").expect("write");

        let handle = FileHandle::new(&session, "exec");
        let spec = format!("/nonexistent:{}", bin.display());
        let expected = bin.join("exec").display().to_string();
        assert_eq!(handle.find_inpath(&spec), expected);
        assert_eq!(handle.find_inpath(&format!("PATH={spec}")), expected);
        assert_eq!(handle.find_inpath("/nonexistent:/also-missing"), "");
    }

    #[test]
    fn find_file_in_dir_returns_first_hit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        std::fs::write(dir.path().join("F2"), "").expect("write");

        let handle = FileHandle::new(&session, dir.path());
        assert_eq!(handle.find_file_in_dir(&[]), "");
        assert_eq!(handle.find_file_in_dir(&["F0", "F1"]), "");
        assert_eq!(
            handle.find_file_in_dir(&["F1", "F2"]),
            dir.path().join("F2").display().to_string()
        );
    }

    #[test]
    fn find_exec_locates_a_shell() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        assert!(!FileHandle::new(&session, "sh").find_exec().is_empty());
        assert_eq!(
            FileHandle::new(&session, "no-such-binary-cask").find_exec(),
            ""
        );
    }

    fn create_test_tar(dir: &Path) -> PathBuf {
        let tar_path = dir.join("test.tar");
        let file = std::fs::File::create(&tar_path).expect("create tar");
        let mut builder = tar::Builder::new(file);
        let data = b"hello from the archive";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "hello.txt", &data[..])
            .expect("append data");
        builder.finish().expect("finish tar");
        tar_path
    }

    #[test]
    fn verify_tar_accepts_a_real_archive() {
        if which::which("tar").is_err() {
            return; // external tool unavailable on this host
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());
        let tar_path = create_test_tar(dir.path());
        assert!(FileHandle::new(&session, &tar_path).verify_tar());
    }

    #[test]
    fn verify_tar_rejects_garbage_and_missing_paths() {
        if which::which("tar").is_err() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session_at(dir.path());

        let garbage = dir.path().join("broken.tar");
        std::fs::write(&garbage, "definitely not a tar archive").expect("write");
        assert!(!FileHandle::new(&session, &garbage).verify_tar());
        assert!(!FileHandle::new(&session, dir.path().join("missing.tar")).verify_tar());
    }
}
