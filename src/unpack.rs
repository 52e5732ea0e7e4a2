//! External tools for moving layer content around.
//!
//! Unpacking and repacking go through `umoci`; tree synchronization goes
//! through `rsync`. Both are behind [`LayerTools`] so the storage drivers
//! and tests can swap in fakes.

use std::path::Path;

use crate::error::Result;
use crate::process::Cmd;

/// Tree sync fidelity switches, all on by default. The full set is what
/// keeps a copied rootfs bootable: hard links, numeric uid/gid, sparse
/// files, deletions, device nodes.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub hardlinks: bool,
    pub numeric_ids: bool,
    pub sparse: bool,
    pub delete: bool,
    pub devices: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            hardlinks: true,
            numeric_ids: true,
            sparse: true,
            delete: true,
            devices: true,
        }
    }
}

/// Layer-level operations on an image layout and local trees.
pub trait LayerTools {
    /// Unpack `reference` (a tag or a bare layer digest) from the layout
    /// at `oci_dir` into a bundle directory. The rootfs lands at
    /// `<bundle>/rootfs`.
    fn unpack(&self, oci_dir: &Path, reference: &str, bundle: &Path) -> Result<()>;

    /// Repack a previously unpacked bundle as a new tag.
    fn repack(&self, oci_dir: &Path, tag: &str, bundle: &Path) -> Result<()>;

    /// Set the entrypoint on an existing tag.
    fn set_entrypoint(&self, oci_dir: &Path, tag: &str, entrypoint: &str) -> Result<()>;

    /// Mirror the contents of `src` into `dest`.
    fn sync_tree(&self, src: &Path, dest: &Path, opts: SyncOptions) -> Result<()>;
}

/// The real thing: shells out to `umoci` and `rsync`.
pub struct UmociTools;

impl LayerTools for UmociTools {
    fn unpack(&self, oci_dir: &Path, reference: &str, bundle: &Path) -> Result<()> {
        Cmd::new("umoci")
            .arg("unpack")
            .arg("--image")
            .arg(image_ref(oci_dir, reference))
            .arg_path(bundle)
            .error_msg(&format!("unpack of '{}' failed", reference))
            .run()?;
        Ok(())
    }

    fn repack(&self, oci_dir: &Path, tag: &str, bundle: &Path) -> Result<()> {
        Cmd::new("umoci")
            .arg("repack")
            .arg("--image")
            .arg(image_ref(oci_dir, tag))
            .arg_path(bundle)
            .error_msg(&format!("repack of '{}' failed", tag))
            .run()?;
        Ok(())
    }

    fn set_entrypoint(&self, oci_dir: &Path, tag: &str, entrypoint: &str) -> Result<()> {
        Cmd::new("umoci")
            .arg("config")
            .arg("--image")
            .arg(image_ref(oci_dir, tag))
            .arg("--config.entrypoint")
            .arg(entrypoint)
            .error_msg(&format!("setting entrypoint on '{}' failed", tag))
            .run()?;
        Ok(())
    }

    fn sync_tree(&self, src: &Path, dest: &Path, opts: SyncOptions) -> Result<()> {
        let mut cmd = Cmd::new("rsync").args(&sync_flags(opts));
        // Trailing slash: copy the contents of src, not src itself.
        cmd = cmd.arg(format!("{}/", src.display())).arg_path(dest);
        cmd.error_msg(&format!(
            "sync of {} into {} failed",
            src.display(),
            dest.display()
        ))
        .run()?;
        Ok(())
    }
}

/// `<layout dir>:<reference>` as umoci wants it.
fn image_ref(oci_dir: &Path, reference: &str) -> String {
    format!("{}:{}", oci_dir.display(), reference)
}

fn sync_flags(opts: SyncOptions) -> Vec<&'static str> {
    let mut flags = vec!["-a", "-x"];
    if opts.hardlinks {
        flags.push("-H");
    }
    if opts.numeric_ids {
        flags.push("--numeric-ids");
    }
    if opts.sparse {
        flags.push("--sparse");
    }
    if opts.delete {
        flags.push("--delete");
    }
    if opts.devices {
        flags.push("--devices");
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn image_ref_joins_dir_and_reference() {
        assert_eq!(
            image_ref(&PathBuf::from("/work/oci"), "web"),
            "/work/oci:web"
        );
    }

    #[test]
    fn default_sync_carries_the_full_fidelity_set() {
        let flags = sync_flags(SyncOptions::default());
        assert_eq!(
            flags,
            vec!["-a", "-x", "-H", "--numeric-ids", "--sparse", "--delete", "--devices"]
        );
    }

    #[test]
    fn sync_flags_can_be_pared_down() {
        let flags = sync_flags(SyncOptions {
            hardlinks: false,
            numeric_ids: false,
            sparse: false,
            delete: false,
            devices: false,
        });
        assert_eq!(flags, vec!["-a", "-x"]);
    }
}
