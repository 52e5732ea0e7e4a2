//! Build step execution against a checked-out rootfs.
//!
//! [`StepRunner`] is the seam between the scheduler and the host: the
//! scheduler decides which steps run, the runner decides how. The real
//! [`HostRunner`] shells out to tar, chroot and cp; tests record calls
//! instead.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::process::Cmd;
use crate::storage::record;

/// Executes the step kinds a recipe target can carry.
pub trait StepRunner {
    /// Untar an archive into the rootfs.
    fn expand_archive(&self, rootfs: &Path, archive: &str) -> Result<()>;

    /// Run a shell command chrooted into the rootfs.
    fn run_command(&self, rootfs: &Path, command: &str) -> Result<()>;

    /// Copy a host file or directory into the rootfs, preserving metadata.
    fn install(&self, rootfs: &Path, source: &str) -> Result<()>;

    /// Remember an entrypoint to stamp onto the image at commit time.
    fn set_entrypoint(&self, entrypoint: &str) -> Result<()>;
}

/// Runs steps directly on the host.
pub struct HostRunner {
    base_dir: PathBuf,
}

impl HostRunner {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl StepRunner for HostRunner {
    fn expand_archive(&self, rootfs: &Path, archive: &str) -> Result<()> {
        Cmd::new("tar")
            .arg("-xf")
            .arg(archive)
            .arg("-C")
            .arg_path(rootfs)
            .error_msg(&format!("expand of '{}' failed", archive))
            .run()?;
        Ok(())
    }

    fn run_command(&self, rootfs: &Path, command: &str) -> Result<()> {
        // Interactive so package managers and prompts stream through.
        Cmd::new("chroot")
            .arg_path(rootfs)
            .arg("/bin/sh")
            .arg("-c")
            .arg(command)
            .error_msg(&format!("run step '{}' failed", command))
            .run_interactive()?;
        Ok(())
    }

    fn install(&self, rootfs: &Path, source: &str) -> Result<()> {
        Cmd::new("cp")
            .arg("-a")
            .arg(source)
            .arg(format!("{}/", rootfs.display()))
            .error_msg(&format!("install of '{}' failed", source))
            .run()?;
        Ok(())
    }

    fn set_entrypoint(&self, entrypoint: &str) -> Result<()> {
        record::save_pending_entrypoint(&self.base_dir, entrypoint)
    }
}
