//! The on-disk checkout record.
//!
//! A checkout is represented by two flat files under the base directory,
//! written together at checkout and removed together at commit or abort.
//! Their presence is the lock: a second checkout refuses while they exist.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::{Config, FsType};
use crate::error::Result;

pub const MOUNTED_TAG_FILE: &str = "mounted_tag";
pub const MOUNTED_DIGEST_FILE: &str = "mounted_digest";
pub const PENDING_ENTRYPOINT_FILE: &str = "pending_entrypoint";

/// What is currently checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRecord {
    pub tag: String,
    pub digest: String,
}

pub fn save(base_dir: &Path, record: &CheckoutRecord) -> Result<()> {
    fs::create_dir_all(base_dir)?;
    fs::write(base_dir.join(MOUNTED_TAG_FILE), &record.tag)?;
    fs::write(base_dir.join(MOUNTED_DIGEST_FILE), &record.digest)?;
    Ok(())
}

/// Load the record, or `None` when no checkout is active. A half-written
/// record also reads as `None`; [`consistency_findings`] reports it.
pub fn load(base_dir: &Path) -> Result<Option<CheckoutRecord>> {
    let tag_path = base_dir.join(MOUNTED_TAG_FILE);
    let digest_path = base_dir.join(MOUNTED_DIGEST_FILE);
    if !tag_path.exists() || !digest_path.exists() {
        return Ok(None);
    }
    let tag = fs::read_to_string(&tag_path)?.trim().to_string();
    let digest = fs::read_to_string(&digest_path)?.trim().to_string();
    Ok(Some(CheckoutRecord { tag, digest }))
}

pub fn exists(base_dir: &Path) -> bool {
    base_dir.join(MOUNTED_TAG_FILE).exists() && base_dir.join(MOUNTED_DIGEST_FILE).exists()
}

/// Remove the record and any parked entrypoint.
pub fn clear(base_dir: &Path) -> Result<()> {
    for name in [MOUNTED_TAG_FILE, MOUNTED_DIGEST_FILE, PENDING_ENTRYPOINT_FILE] {
        remove_if_present(&base_dir.join(name))?;
    }
    Ok(())
}

pub fn save_pending_entrypoint(base_dir: &Path, entrypoint: &str) -> Result<()> {
    fs::create_dir_all(base_dir)?;
    fs::write(base_dir.join(PENDING_ENTRYPOINT_FILE), entrypoint)?;
    Ok(())
}

/// Read and remove the parked entrypoint, if any.
pub fn take_pending_entrypoint(base_dir: &Path) -> Result<Option<String>> {
    let path = base_dir.join(PENDING_ENTRYPOINT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let value = fs::read_to_string(&path)?.trim().to_string();
    remove_if_present(&path)?;
    Ok(Some(value))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cross-check the record against what is actually on disk.
///
/// Findings are reported, never repaired; a human (or `abort`) decides
/// what to do about them.
pub fn consistency_findings(config: &Config) -> Vec<String> {
    let mut findings = Vec::new();
    let base = &config.base_dir;

    let has_tag = base.join(MOUNTED_TAG_FILE).exists();
    let has_digest = base.join(MOUNTED_DIGEST_FILE).exists();
    if has_tag != has_digest {
        let missing = if has_tag {
            MOUNTED_DIGEST_FILE
        } else {
            MOUNTED_TAG_FILE
        };
        findings.push(format!("checkout record is torn: {} is missing", missing));
        return findings;
    }

    let workdir = config.unpack_dir();
    match load(base) {
        Ok(Some(record)) => {
            if !workdir.exists() {
                findings.push(format!(
                    "checkout record names tag '{}' but work directory {} is missing",
                    record.tag,
                    workdir.display()
                ));
            }
            if config.fs_type == FsType::Btrfs
                && !record.digest.is_empty()
                && crate::storage::btrfs::is_mountpoint(&config.btrfs_mount)
                && !config.btrfs_mount.join(&record.digest).exists()
            {
                findings.push(format!(
                    "checkout record digest {} has no snapshot under {}",
                    record.digest,
                    config.btrfs_mount.display()
                ));
            }
        }
        Ok(None) => {
            if workdir.exists() {
                findings.push(format!(
                    "work directory {} exists but no checkout record does",
                    workdir.display()
                ));
            }
        }
        Err(e) => findings.push(format!("checkout record is unreadable: {}", e)),
    }

    findings
}
