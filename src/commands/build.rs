//! Build command - builds every target in a recipe.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::oci::OciLayout;
use crate::recipe::Recipe;
use crate::runner::HostRunner;
use crate::scheduler::BuildScheduler;
use crate::storage::open_backend;

/// Execute the build command.
pub fn cmd_build(config: &Config, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read recipe {}", file.display()))?;
    let recipe = Recipe::parse(&text)?;

    let store = OciLayout::new(&config.oci_dir);
    if let Err(e) = recipe.validate(&store) {
        bail!("invalid recipe: {}", e);
    }

    let backend = open_backend(config)?;
    let runner = HostRunner::new(&config.base_dir);
    let scheduler = BuildScheduler::new(&store, backend.as_ref(), &runner);

    let built = scheduler.run(&recipe)?;
    println!("Built {} target(s): {:?}", built.len(), built);
    Ok(())
}
