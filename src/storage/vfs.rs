//! The copy-everything driver.
//!
//! Works on any filesystem: checkout unpacks the whole image into a plain
//! directory, commit repacks it. No snapshots, no sharing between working
//! copies, no volume to provision.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::oci::{OciLayout, TagStore};
use crate::recipe::EMPTY_BASE;
use crate::storage::record::{self, CheckoutRecord};
use crate::storage::{AbortOutcome, BaseRef, ConfirmGate, StdinGate, StorageBackend};
use crate::unpack::{LayerTools, UmociTools};

pub struct VfsBackend {
    base_dir: PathBuf,
    oci_dir: PathBuf,
    workdir: PathBuf,
    store: Box<dyn TagStore>,
    tools: Box<dyn LayerTools>,
    gate: Box<dyn ConfirmGate>,
}

impl VfsBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            oci_dir: config.oci_dir.clone(),
            workdir: config.unpack_dir(),
            store: Box::new(OciLayout::new(&config.oci_dir)),
            tools: Box::new(UmociTools),
            gate: Box::new(StdinGate),
        }
    }

    /// Wire a backend out of explicit parts. Tests use this to swap in
    /// fakes for the store, the tools and the prompt.
    pub fn with_parts(
        base_dir: impl Into<PathBuf>,
        oci_dir: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        store: Box<dyn TagStore>,
        tools: Box<dyn LayerTools>,
        gate: Box<dyn ConfirmGate>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            oci_dir: oci_dir.into(),
            workdir: workdir.into(),
            store,
            tools,
            gate,
        }
    }

    fn rootfs(&self) -> PathBuf {
        self.workdir.join("rootfs")
    }

    fn guard_no_active_checkout(&self) -> Result<()> {
        if let Some(existing) = record::load(&self.base_dir)? {
            return Err(StorageError::AlreadyCheckedOut(existing.tag).into());
        }
        if self.workdir.exists() {
            return Err(StorageError::Inconsistent(format!(
                "{} is not empty",
                self.workdir.display()
            ))
            .into());
        }
        Ok(())
    }
}

impl StorageBackend for VfsBackend {
    fn checkout(&self, base: &BaseRef) -> Result<PathBuf> {
        self.guard_no_active_checkout()?;

        match base {
            BaseRef::Empty => {
                fs::create_dir_all(self.rootfs())?;
                record::save(
                    &self.base_dir,
                    &CheckoutRecord {
                        tag: EMPTY_BASE.to_string(),
                        digest: String::new(),
                    },
                )?;
            }
            BaseRef::Tag(tag) => {
                // Resolve first so a bad tag fails before disk changes.
                let digest = self.store.resolve_digest(tag)?;
                self.tools.unpack(&self.oci_dir, tag, &self.workdir)?;
                record::save(
                    &self.base_dir,
                    &CheckoutRecord {
                        tag: tag.clone(),
                        digest,
                    },
                )?;
            }
        }

        Ok(self.rootfs())
    }

    fn commit(&self, new_tag: &str) -> Result<()> {
        if record::load(&self.base_dir)?.is_none() {
            return Err(StorageError::NotCheckedOut.into());
        }

        self.tools.repack(&self.oci_dir, new_tag, &self.workdir)?;
        if let Some(entrypoint) = record::take_pending_entrypoint(&self.base_dir)? {
            self.tools.set_entrypoint(&self.oci_dir, new_tag, &entrypoint)?;
        }

        fs::remove_dir_all(&self.workdir)?;
        record::clear(&self.base_dir)?;
        Ok(())
    }

    fn abort(&self, force: bool) -> Result<AbortOutcome> {
        // A stray work directory without a record is still abortable;
        // that is the cleanup path for a crashed run.
        if !record::exists(&self.base_dir) && !self.workdir.exists() {
            return Err(StorageError::NothingToAbort.into());
        }

        if !force {
            let prompt = format!("Really delete '{}'? (y/n) ", self.workdir.display());
            if !self.gate.confirm(&prompt) {
                return Ok(AbortOutcome::Declined);
            }
        }

        if self.workdir.exists() {
            fs::remove_dir_all(&self.workdir)?;
        }
        record::clear(&self.base_dir)?;
        Ok(AbortOutcome::Aborted)
    }
}
