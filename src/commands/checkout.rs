//! Checkout command - materializes a writable rootfs from a tag.

use anyhow::Result;

use crate::config::Config;
use crate::storage::{open_backend, BaseRef};

/// Execute the checkout command.
pub fn cmd_checkout(config: &Config, tag: &str) -> Result<()> {
    let backend = open_backend(config)?;
    let rootfs = backend.checkout(&BaseRef::parse(tag))?;
    println!("Checked out '{}' at {}", tag, rootfs.display());
    Ok(())
}
