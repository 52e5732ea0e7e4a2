//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build every target in a recipe
//! - `checkout` - Materialize a writable rootfs from a tag
//! - `checkin` - Commit the working copy as a new tag
//! - `abort` - Throw the working copy away
//! - `ls` - List tags in the image store
//! - `config` - Display the effective configuration
//! - `volume` - Manage the btrfs backing volume
//! - `preflight` - Run preflight checks

pub mod abort;
pub mod build;
pub mod checkin;
pub mod checkout;
pub mod config;
pub mod ls;
pub mod preflight;
pub mod volume;

pub use abort::cmd_abort;
pub use build::cmd_build;
pub use checkin::cmd_checkin;
pub use checkout::cmd_checkout;
pub use config::cmd_config_show;
pub use ls::cmd_ls;
pub use preflight::cmd_preflight;
pub use volume::{cmd_volume_deprovision, cmd_volume_provision};
