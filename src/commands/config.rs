//! Config command - displays the effective configuration.

use anyhow::Result;

use crate::config::Config;

/// Execute the `config show` command.
pub fn cmd_config_show(config: &Config) -> Result<()> {
    config.show();
    Ok(())
}
