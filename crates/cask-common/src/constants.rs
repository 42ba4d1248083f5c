//! System-wide constants for the cask workspace.

/// Application name used in log output and state files.
pub const APP_NAME: &str = "cask";

/// Prefix of every temporary path minted by the filesystem layer.
///
/// Temp paths follow `<tmpdir>/<TMP_PREFIX>-<token>-<basename>`.
pub const TMP_PREFIX: &str = "cask";

/// Sentinel prefix of the virtual (location-independent) symlink form.
///
/// A link target stored as `$CASK_ROOT/usr/lib/libc.so` stays valid no
/// matter where the container tree is mounted; restoring substitutes the
/// sentinel with the tree's current root directory.
pub const VIRTUAL_ROOT: &str = "$CASK_ROOT";
