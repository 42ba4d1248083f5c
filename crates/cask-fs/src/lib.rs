//! # cask-fs
//!
//! Filesystem-safety core of the cask rootless container runtime.
//!
//! This crate provides the userspace bookkeeping the higher layers
//! (layer extraction, the launcher, configuration loading) rely on:
//! - **Sandbox**: a fail-closed registry of path prefixes approved for
//!   destructive operations.
//! - **Removal**: deletion of files, directories, and symlinks that can
//!   never escape the sandbox or cross ownership boundaries.
//! - **Temp registry**: allocation and batch cleanup of temporary paths,
//!   plus umask save/restore bookkeeping.
//! - **Link virtualization**: rewriting absolute symlinks inside an
//!   unpacked root filesystem so the tree survives relocation.
//!
//! No kernel namespace, mount, or process-supervision logic lives here.
//! Unix only: the operations are defined in terms of symlinks, owner
//! uids, and umask.

pub mod fileops;
pub mod links;
pub mod remove;
pub mod sandbox;
pub mod session;
pub mod tmp;
