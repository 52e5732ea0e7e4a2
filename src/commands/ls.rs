//! Ls command - lists tags in the image store.

use anyhow::Result;

use crate::config::Config;
use crate::oci::{OciLayout, TagStore};

/// Execute the ls command.
pub fn cmd_ls(config: &Config) -> Result<()> {
    let layout = OciLayout::new(&config.oci_dir);
    for tag in layout.list_tags()? {
        println!("{}", tag);
    }
    Ok(())
}
