//! Volume command - manages the btrfs backing volume.

use anyhow::{bail, Result};

use crate::config::{Config, FsType};
use crate::storage::open_backend;

/// Execute the `volume provision` command.
pub fn cmd_volume_provision(config: &Config) -> Result<()> {
    guard_btrfs(config)?;
    let backend = open_backend(config)?;
    backend.provision_volume()?;
    println!("Volume ready at {}", config.btrfs_mount.display());
    Ok(())
}

/// Execute the `volume deprovision` command.
pub fn cmd_volume_deprovision(config: &Config) -> Result<()> {
    guard_btrfs(config)?;
    let backend = open_backend(config)?;
    backend.deprovision_volume()?;
    println!("Volume torn down");
    Ok(())
}

fn guard_btrfs(config: &Config) -> Result<()> {
    if config.fs_type != FsType::Btrfs {
        bail!(
            "volume management applies to the btrfs driver only (configured: {})",
            config.fs_type
        );
    }
    Ok(())
}
