//! Checkin command - commits the working copy as a new tag.

use anyhow::Result;

use crate::config::Config;
use crate::storage::open_backend;

/// Execute the checkin command.
pub fn cmd_checkin(config: &Config, new_tag: &str) -> Result<()> {
    let backend = open_backend(config)?;
    backend.commit(new_tag)?;
    println!("Checked in '{}'", new_tag);
    Ok(())
}
