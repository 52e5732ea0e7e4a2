//! The snapshot driver.
//!
//! Layers live as subvolumes on a loopback-mounted btrfs volume, one
//! subvolume per layer digest holding the full rootfs as of that layer.
//! Materializing a layer is a snapshot of its parent plus one rsync of the
//! unpacked content, so shared history costs nothing. Checkout snapshots
//! the resolved layer's subvolume; the backing volume is created and
//! mounted on demand.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::oci::{OciLayout, TagStore};
use crate::process::Cmd;
use crate::recipe::EMPTY_BASE;
use crate::storage::record::{self, CheckoutRecord};
use crate::storage::{AbortOutcome, BaseRef, ConfirmGate, StdinGate, StorageBackend};
use crate::unpack::{LayerTools, SyncOptions, UmociTools};

/// Whether `path` is currently a mountpoint. Shells out to `mountpoint -q`;
/// anything going wrong reads as "not mounted".
pub fn is_mountpoint(path: &Path) -> bool {
    Cmd::new("mountpoint")
        .arg("-q")
        .arg_path(path)
        .allow_fail()
        .run()
        .map(|r| r.success())
        .unwrap_or(false)
}

/// One shell-level action on the backing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeStep {
    CreateBackingFile,
    MakeFilesystem,
    Mount,
    Unmount,
    RemoveBackingFile,
}

/// Steps to bring the volume up from the observed state. Each half is
/// skipped when already done, so provisioning twice is a no-op.
pub fn provision_steps(file_exists: bool, mounted: bool) -> Vec<VolumeStep> {
    let mut steps = Vec::new();
    if !file_exists {
        steps.push(VolumeStep::CreateBackingFile);
        steps.push(VolumeStep::MakeFilesystem);
    }
    if !mounted {
        steps.push(VolumeStep::Mount);
    }
    steps
}

/// Steps to tear the volume down from the observed state.
pub fn deprovision_steps(file_exists: bool, mounted: bool) -> Vec<VolumeStep> {
    let mut steps = Vec::new();
    if mounted {
        steps.push(VolumeStep::Unmount);
    }
    if file_exists {
        steps.push(VolumeStep::RemoveBackingFile);
    }
    steps
}

/// One subvolume operation in a layer chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOp {
    /// First layer of a chain: a fresh subvolume.
    Create { layer: String },
    /// Any later layer: snapshot of the previous layer's subvolume.
    Snapshot { parent: String, layer: String },
}

impl ChainOp {
    pub fn layer(&self) -> &str {
        match self {
            ChainOp::Create { layer } => layer,
            ChainOp::Snapshot { layer, .. } => layer,
        }
    }
}

/// Plan the subvolume work for a digest chain, bottom to top. Layers whose
/// subvolume already exists are skipped but still act as the parent of the
/// next snapshot.
pub fn plan_chain(layers: &[String], exists: impl Fn(&str) -> bool) -> Vec<ChainOp> {
    let mut ops = Vec::new();
    let mut prev: Option<&str> = None;
    for layer in layers {
        if !exists(layer) {
            ops.push(match prev {
                None => ChainOp::Create {
                    layer: layer.clone(),
                },
                Some(parent) => ChainOp::Snapshot {
                    parent: parent.to_string(),
                    layer: layer.clone(),
                },
            });
        }
        prev = Some(layer.as_str());
    }
    ops
}

pub struct BtrfsBackend {
    base_dir: PathBuf,
    oci_dir: PathBuf,
    mount: PathBuf,
    lo_file: PathBuf,
    volume_size: String,
    workdir: PathBuf,
    layout: OciLayout,
    tools: Box<dyn LayerTools>,
    gate: Box<dyn ConfirmGate>,
}

impl BtrfsBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            oci_dir: config.oci_dir.clone(),
            mount: config.btrfs_mount.clone(),
            lo_file: config.lo_file.clone(),
            volume_size: config.volume_size.clone(),
            workdir: config.unpack_dir(),
            layout: OciLayout::new(&config.oci_dir),
            tools: Box::new(UmociTools),
            gate: Box::new(StdinGate),
        }
    }

    fn rootfs(&self) -> PathBuf {
        self.workdir.join("rootfs")
    }

    fn volume_state(&self) -> (bool, bool) {
        (self.lo_file.exists(), is_mountpoint(&self.mount))
    }

    fn apply_volume_step(&self, step: VolumeStep) -> Result<()> {
        match step {
            VolumeStep::CreateBackingFile => {
                if let Some(parent) = self.lo_file.parent() {
                    fs::create_dir_all(parent)?;
                }
                Cmd::new("truncate")
                    .arg("-s")
                    .arg(&self.volume_size)
                    .arg_path(&self.lo_file)
                    .run()?;
            }
            VolumeStep::MakeFilesystem => {
                Cmd::new("mkfs.btrfs").arg_path(&self.lo_file).run()?;
            }
            VolumeStep::Mount => {
                fs::create_dir_all(&self.mount)?;
                Cmd::new("mount")
                    .arg("-o")
                    .arg("loop")
                    .arg("-t")
                    .arg("btrfs")
                    .arg_path(&self.lo_file)
                    .arg_path(&self.mount)
                    .run()?;
            }
            VolumeStep::Unmount => {
                // Lazy, matching a detaching unmount: busy paths release
                // once the last user goes away.
                Cmd::new("umount").arg("-l").arg_path(&self.mount).run()?;
            }
            VolumeStep::RemoveBackingFile => {
                fs::remove_file(&self.lo_file)?;
            }
        }
        Ok(())
    }

    fn ensure_volume(&self) -> Result<()> {
        let (file_exists, mounted) = self.volume_state();
        for step in provision_steps(file_exists, mounted) {
            self.apply_volume_step(step)?;
        }
        Ok(())
    }

    fn subvol_create(&self, dest: &Path) -> Result<()> {
        Cmd::new("btrfs")
            .arg("subvolume")
            .arg("create")
            .arg_path(dest)
            .run()?;
        Ok(())
    }

    fn subvol_snapshot(&self, src: &Path, dest: &Path) -> Result<()> {
        Cmd::new("btrfs")
            .arg("subvolume")
            .arg("snapshot")
            .arg_path(src)
            .arg_path(dest)
            .run()?;
        Ok(())
    }

    fn subvol_delete(&self, dest: &Path) -> Result<()> {
        Cmd::new("btrfs")
            .arg("subvolume")
            .arg("delete")
            .arg_path(dest)
            .run()?;
        Ok(())
    }

    /// Materialize every missing layer subvolume for `tag`.
    ///
    /// Each new subvolume starts as a snapshot of its parent, then one
    /// rsync of the layer's unpacked rootfs brings it up to date.
    fn populate_chain(&self, tag: &str) -> Result<()> {
        let layers = self.layout.layer_digests(tag)?;
        let ops = plan_chain(&layers, |layer| self.mount.join(layer).exists());
        if ops.is_empty() {
            return Ok(());
        }

        let scratch = self.base_dir.join("unpack-tmp");
        for op in &ops {
            match op {
                ChainOp::Create { layer } => {
                    self.subvol_create(&self.mount.join(layer))?;
                }
                ChainOp::Snapshot { parent, layer } => {
                    self.subvol_snapshot(&self.mount.join(parent), &self.mount.join(layer))?;
                }
            }

            // umoci wants a fresh bundle directory each time.
            if scratch.exists() {
                fs::remove_dir_all(&scratch)?;
            }
            fs::create_dir_all(&scratch)?;
            self.tools.unpack(&self.oci_dir, op.layer(), &scratch)?;
            self.tools.sync_tree(
                &scratch.join("rootfs"),
                &self.mount.join(op.layer()),
                SyncOptions::default(),
            )?;
        }

        if scratch.exists() {
            fs::remove_dir_all(&scratch)?;
        }
        Ok(())
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

    fn teardown_workdir(&self) -> Result<()> {
        let rootfs = self.rootfs();
        if rootfs.exists() {
            self.subvol_delete(&rootfs)?;
        }
        if self.workdir.exists() {
            fs::remove_dir_all(&self.workdir)?;
        }
        Ok(())
    }
}

impl StorageBackend for BtrfsBackend {
    fn checkout(&self, base: &BaseRef) -> Result<PathBuf> {
        self.guard_no_active_checkout()?;

        match base {
            BaseRef::Empty => {
                self.ensure_volume()?;
                fs::create_dir_all(&self.workdir)?;
                self.subvol_create(&self.rootfs())?;
                record::save(
                    &self.base_dir,
                    &CheckoutRecord {
                        tag: EMPTY_BASE.to_string(),
                        digest: String::new(),
                    },
                )?;
            }
            BaseRef::Tag(tag) => {
                let digest = self.layout.resolve_digest(tag)?;
                self.ensure_volume()?;
                self.populate_chain(tag)?;
                fs::create_dir_all(&self.workdir)?;
                self.subvol_snapshot(&self.mount.join(&digest), &self.rootfs())?;
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

        // The volume may have been unmounted since checkout.
        self.ensure_volume()?;
        self.tools.repack(&self.oci_dir, new_tag, &self.workdir)?;
        if let Some(entrypoint) = record::take_pending_entrypoint(&self.base_dir)? {
            self.tools.set_entrypoint(&self.oci_dir, new_tag, &entrypoint)?;
        }

        // Bring the new tag's layers into the subvolume cache so the next
        // checkout of it snapshots instead of unpacking.
        self.populate_chain(new_tag)?;

        self.teardown_workdir()?;
        record::clear(&self.base_dir)?;
        Ok(())
    }

    fn abort(&self, force: bool) -> Result<AbortOutcome> {
        if !record::exists(&self.base_dir) && !self.workdir.exists() {
            return Err(StorageError::NothingToAbort.into());
        }

        if !force {
            let prompt = format!("Really delete '{}'? (y/n) ", self.workdir.display());
            if !self.gate.confirm(&prompt) {
                return Ok(AbortOutcome::Declined);
            }
        }

        self.teardown_workdir()?;
        record::clear(&self.base_dir)?;
        Ok(AbortOutcome::Aborted)
    }

    fn provision_volume(&self) -> Result<()> {
        self.ensure_volume()
    }

    fn deprovision_volume(&self) -> Result<()> {
        if record::exists(&self.base_dir) {
            return Err(StorageError::Inconsistent(
                "a checkout is active; commit or abort it first".to_string(),
            )
            .into());
        }
        let (file_exists, mounted) = self.volume_state();
        for step in deprovision_steps(file_exists, mounted) {
            self.apply_volume_step(step)?;
        }
        Ok(())
    }
}
