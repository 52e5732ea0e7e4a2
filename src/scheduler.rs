//! Breadth-by-breadth build scheduling.
//!
//! Targets are swept in file order; a target builds once its base is
//! satisfied (the reserved empty base, a tag built earlier in this run, or
//! a tag already in the store) and is deferred otherwise. Sweeping repeats
//! until everything is built. A sweep that builds nothing means the
//! remaining targets can never be satisfied, which is an error rather than
//! an endless loop.

use crate::error::{Result, SchedulingError};
use crate::oci::TagStore;
use crate::recipe::{Recipe, Target, EMPTY_BASE};
use crate::runner::StepRunner;
use crate::storage::{BaseRef, StorageBackend};

pub struct BuildScheduler<'a> {
    store: &'a dyn TagStore,
    backend: &'a dyn StorageBackend,
    runner: &'a dyn StepRunner,
}

impl<'a> BuildScheduler<'a> {
    pub fn new(
        store: &'a dyn TagStore,
        backend: &'a dyn StorageBackend,
        runner: &'a dyn StepRunner,
    ) -> Self {
        Self {
            store,
            backend,
            runner,
        }
    }

    /// Build every target in the recipe. Returns the names in the order
    /// they were built.
    pub fn run(&self, recipe: &Recipe) -> Result<Vec<String>> {
        let mut remaining: Vec<&Target> = recipe.targets().iter().collect();
        let mut built: Vec<String> = Vec::new();

        while !remaining.is_empty() {
            let names: Vec<&str> = remaining.iter().map(|t| t.name.as_str()).collect();
            println!("Built: {:?}; targets: {:?}", built, names);

            let before = remaining.len();
            let mut deferred: Vec<&Target> = Vec::new();
            for target in remaining {
                if self.base_ready(&built, &target.base) {
                    self.build_target(target)?;
                    built.push(target.name.clone());
                } else {
                    deferred.push(target);
                }
            }

            if deferred.len() == before {
                return Err(SchedulingError::UnsatisfiableGraph {
                    remaining: deferred.iter().map(|t| t.name.clone()).collect(),
                }
                .into());
            }
            remaining = deferred;
        }

        Ok(built)
    }

    fn base_ready(&self, built: &[String], base: &str) -> bool {
        base == EMPTY_BASE || built.iter().any(|b| b == base) || self.store.tag_exists(base)
    }

    /// Checkout, steps, commit. A failed step rolls the checkout back so
    /// the next run starts from a clean slate.
    fn build_target(&self, target: &Target) -> Result<()> {
        println!("=== {} (base: {}) ===", target.name, target.base);

        let rootfs = self.backend.checkout(&BaseRef::parse(&target.base))?;

        if let Err(e) = self.apply_steps(target, &rootfs) {
            if let Err(abort_err) = self.backend.abort(true) {
                eprintln!("cleanup of failed build also failed: {}", abort_err);
            }
            return Err(e);
        }

        self.backend.commit(&target.name)?;
        Ok(())
    }

    fn apply_steps(&self, target: &Target, rootfs: &std::path::Path) -> Result<()> {
        for archive in &target.expand {
            println!("  expand {}", archive);
            self.runner.expand_archive(rootfs, archive)?;
        }
        for command in &target.run {
            println!("  run {}", command);
            self.runner.run_command(rootfs, command)?;
        }
        for source in &target.install {
            println!("  install {}", source);
            self.runner.install(rootfs, source)?;
        }
        if let Some(entrypoint) = &target.entrypoint {
            println!("  entrypoint {}", entrypoint);
            self.runner.set_entrypoint(entrypoint)?;
        }
        Ok(())
    }
}
