//! Storage backends.
//!
//! A backend owns the working copy lifecycle: `checkout` materializes a
//! writable rootfs from a base, `commit` turns the edited rootfs into a new
//! tag, `abort` throws the edits away. At most one checkout is active at a
//! time, tracked by the on-disk record in [`record`].
//!
//! Two drivers: [`vfs::VfsBackend`] copies trees around and works anywhere;
//! [`btrfs::BtrfsBackend`] snapshots subvolumes on a loopback-mounted
//! volume it provisions itself.

pub mod btrfs;
pub mod record;
pub mod vfs;

use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::config::{Config, FsType};
use crate::error::{Result, StorageError};
use crate::recipe::EMPTY_BASE;

/// What a checkout starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseRef {
    /// A blank rootfs, no source tag.
    Empty,
    /// An existing tag in the store.
    Tag(String),
}

impl BaseRef {
    pub fn parse(s: &str) -> BaseRef {
        if s == EMPTY_BASE {
            BaseRef::Empty
        } else {
            BaseRef::Tag(s.to_string())
        }
    }
}

impl fmt::Display for BaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseRef::Empty => f.write_str(EMPTY_BASE),
            BaseRef::Tag(tag) => f.write_str(tag),
        }
    }
}

/// How an abort ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    Aborted,
    /// The user answered no at the prompt; nothing was touched.
    Declined,
}

/// Asks the user before destroying work.
pub trait ConfirmGate {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads the answer from stdin; the first `y`/`Y` wins.
pub struct StdinGate;

impl ConfirmGate for StdinGate {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().chars().next(), Some('y') | Some('Y'))
    }
}

/// The working copy lifecycle every driver implements.
pub trait StorageBackend {
    /// Materialize a writable rootfs from `base` and write the checkout
    /// record. Returns the rootfs path. Fails if a checkout is already
    /// active.
    fn checkout(&self, base: &BaseRef) -> Result<PathBuf>;

    /// Turn the checked-out rootfs into tag `new_tag`, apply any parked
    /// entrypoint, then tear the working copy down and clear the record.
    fn commit(&self, new_tag: &str) -> Result<()>;

    /// Destroy the working copy and clear the record. Prompts first
    /// unless `force` is set.
    fn abort(&self, force: bool) -> Result<AbortOutcome>;

    /// Create the backing volume if the driver needs one.
    fn provision_volume(&self) -> Result<()> {
        Ok(())
    }

    /// Tear the backing volume down.
    fn deprovision_volume(&self) -> Result<()> {
        Ok(())
    }
}

/// Pick the driver for the configured fs type.
pub fn open_backend(config: &Config) -> Result<Box<dyn StorageBackend>> {
    match config.fs_type {
        FsType::Vfs => Ok(Box::new(vfs::VfsBackend::new(config))),
        FsType::Btrfs => Ok(Box::new(btrfs::BtrfsBackend::new(config))),
        other => Err(StorageError::UnsupportedBackend(other.as_str().to_string()).into()),
    }
}
