//! Abort command - throws the working copy away.

use anyhow::Result;

use crate::config::Config;
use crate::storage::{open_backend, AbortOutcome};

/// Execute the abort command. Declining the prompt is not an error.
pub fn cmd_abort(config: &Config, force: bool) -> Result<()> {
    let backend = open_backend(config)?;
    match backend.abort(force)? {
        AbortOutcome::Aborted => Ok(()),
        AbortOutcome::Declined => {
            println!("Aborting.");
            Ok(())
        }
    }
}
