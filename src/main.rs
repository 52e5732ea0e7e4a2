//! Laminate - layered rootfs image builder.
//!
//! Builds tagged rootfs images from YAML recipes on top of an OCI image
//! layout, with interchangeable storage drivers:
//! - vfs: plain directory copies, works anywhere
//! - btrfs: subvolume snapshots on a self-provisioned loopback volume

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use laminate::commands;
use laminate::config::Config;
use laminate::storage::record;

#[derive(Parser)]
#[command(name = "laminate")]
#[command(about = "Layered rootfs image builder")]
#[command(
    after_help = "QUICK START:\n  laminate preflight        Check host tools\n  laminate build FILE       Build every target in a recipe\n  laminate checkout TAG     Open a tag as a writable rootfs\n  laminate checkin NEWTAG   Commit the working copy as a new tag\n  laminate abort            Throw the working copy away"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every target in a recipe file
    Build {
        /// Recipe file (YAML, targets in build order)
        file: PathBuf,
    },

    /// Check a tag out as a writable rootfs
    Checkout {
        /// Tag to check out, or "empty" for a blank rootfs
        tag: String,
    },

    /// Commit the working copy as a new tag
    Checkin {
        /// Name for the new tag
        tag: String,
    },

    /// Throw the working copy away
    Abort {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List tags in the image store
    Ls,

    /// Configuration
    Config {
        #[command(subcommand)]
        what: ConfigTarget,
    },

    /// Manage the btrfs backing volume
    Volume {
        #[command(subcommand)]
        what: VolumeTarget,
    },

    /// Run preflight checks (verify host tools before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ConfigTarget {
    /// Show the merged configuration and checkout state
    Show,
}

#[derive(Subcommand)]
enum VolumeTarget {
    /// Create and mount the backing volume
    Provision,
    /// Unmount the volume and remove its backing file
    Deprovision,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Surface stale or torn checkout state early; never auto-repair.
    for finding in record::consistency_findings(&config) {
        eprintln!("[WARN] {}", finding);
    }

    match cli.command {
        Commands::Build { file } => {
            commands::cmd_build(&config, &file)?;
        }

        Commands::Checkout { tag } => {
            commands::cmd_checkout(&config, &tag)?;
        }

        Commands::Checkin { tag } => {
            commands::cmd_checkin(&config, &tag)?;
        }

        Commands::Abort { force } => {
            commands::cmd_abort(&config, force)?;
        }

        Commands::Ls => {
            commands::cmd_ls(&config)?;
        }

        Commands::Config { what } => match what {
            ConfigTarget::Show => commands::cmd_config_show(&config)?,
        },

        Commands::Volume { what } => match what {
            VolumeTarget::Provision => commands::cmd_volume_provision(&config)?,
            VolumeTarget::Deprovision => commands::cmd_volume_deprovision(&config)?,
        },

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
