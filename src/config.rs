//! Configuration management for laminate.
//!
//! Configuration is merged from three layers, later layers winning:
//! compiled defaults, a `laminate.yml` file (current directory first, then
//! `~/.config/laminate.yml`), and `LAMINATE_*` environment variables.
//! The result is a plain value threaded into every component; there is no
//! global.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::record;

/// Config file name, looked up in the current directory and `~/.config`.
pub const CONFIG_FILE: &str = "laminate.yml";

/// Default size for the btrfs backing file.
pub const DEFAULT_VOLUME_SIZE: &str = "20G";

/// Filesystem driver for the storage backend. A closed set: `vfs` and
/// `btrfs` are implemented, `zfs` and `lvm` parse but are rejected when the
/// backend is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Vfs,
    Btrfs,
    Zfs,
    Lvm,
}

impl FsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsType::Vfs => "vfs",
            FsType::Btrfs => "btrfs",
            FsType::Zfs => "zfs",
            FsType::Lvm => "lvm",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vfs" => Ok(FsType::Vfs),
            "btrfs" => Ok(FsType::Btrfs),
            "zfs" => Ok(FsType::Zfs),
            "lvm" => Ok(FsType::Lvm),
            other => Err(Error::Config(format!("unknown fs type '{}'", other))),
        }
    }
}

/// Laminate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding working copies and checkout state (default: ".").
    pub base_dir: PathBuf,
    /// OCI image layout directory (default: `<basedir>/oci`).
    pub oci_dir: PathBuf,
    /// Storage driver.
    pub fs_type: FsType,
    /// Backing file for the btrfs volume (default: `<basedir>/btrfs.img`).
    pub lo_file: PathBuf,
    /// Mountpoint for the btrfs volume (default: `<basedir>/btrfs`).
    pub btrfs_mount: PathBuf,
    /// Size passed to `truncate -s` when creating the backing file.
    pub volume_size: String,
}

/// One layer of configuration; `None` means "not set at this layer".
///
/// Doubles as the schema for `laminate.yml`, so unknown keys in the file
/// are rejected at parse time.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Overlay {
    basedir: Option<PathBuf>,
    ocidir: Option<PathBuf>,
    fstype: Option<FsType>,
    lofile: Option<PathBuf>,
    btrfsmount: Option<PathBuf>,
    volsize: Option<String>,
}

impl Overlay {
    fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    fn from_env() -> Result<Self> {
        let mut o = Overlay::default();
        o.basedir = std::env::var("LAMINATE_BASEDIR").ok().map(PathBuf::from);
        o.ocidir = std::env::var("LAMINATE_OCIDIR").ok().map(PathBuf::from);
        o.fstype = match std::env::var("LAMINATE_FSTYPE") {
            Ok(s) => Some(
                FsType::from_str(&s)
                    .map_err(|e| Error::Config(format!("LAMINATE_FSTYPE: {}", e)))?,
            ),
            Err(_) => None,
        };
        o.lofile = std::env::var("LAMINATE_LOFILE").ok().map(PathBuf::from);
        o.btrfsmount = std::env::var("LAMINATE_BTRFSMOUNT").ok().map(PathBuf::from);
        o.volsize = std::env::var("LAMINATE_VOLSIZE").ok();
        Ok(o)
    }

    /// Merge another layer on top of this one.
    fn merge(&mut self, other: Overlay) {
        if other.basedir.is_some() {
            self.basedir = other.basedir;
        }
        if other.ocidir.is_some() {
            self.ocidir = other.ocidir;
        }
        if other.fstype.is_some() {
            self.fstype = other.fstype;
        }
        if other.lofile.is_some() {
            self.lofile = other.lofile;
        }
        if other.btrfsmount.is_some() {
            self.btrfsmount = other.btrfsmount;
        }
        if other.volsize.is_some() {
            self.volsize = other.volsize;
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// File lookup order: `laminate.yml` in the current directory, then
    /// `~/.config/laminate.yml`. Environment variables override the file.
    pub fn load() -> Result<Self> {
        let mut overlay = Overlay::default();

        if let Some((path, text)) = read_config_file()? {
            let file = Overlay::from_yaml(&text)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            overlay.merge(file);
        }

        overlay.merge(Overlay::from_env()?);
        Ok(Config::resolve(overlay))
    }

    /// Fill in defaults and derive unset paths from `basedir`.
    fn resolve(o: Overlay) -> Self {
        let base_dir = o.basedir.unwrap_or_else(|| PathBuf::from("."));
        let oci_dir = o.ocidir.unwrap_or_else(|| base_dir.join("oci"));
        let fs_type = o.fstype.unwrap_or(FsType::Vfs);
        let btrfs_mount = o.btrfsmount.unwrap_or_else(|| base_dir.join("btrfs"));
        let lo_file = o.lofile.unwrap_or_else(|| base_dir.join("btrfs.img"));
        let volume_size = o.volsize.unwrap_or_else(|| DEFAULT_VOLUME_SIZE.to_string());

        Self {
            base_dir,
            oci_dir,
            fs_type,
            lo_file,
            btrfs_mount,
            volume_size,
        }
    }

    /// The working-copy directory for the configured driver.
    pub fn unpack_dir(&self) -> PathBuf {
        match self.fs_type {
            FsType::Btrfs => self.btrfs_mount.join("mounted"),
            _ => self.base_dir.join("unpacked"),
        }
    }

    /// The filesystem root inside the working copy.
    pub fn rootfs_dir(&self) -> PathBuf {
        self.unpack_dir().join("rootfs")
    }

    /// Print the merged configuration and live on-disk state.
    pub fn show(&self) {
        println!("basedir: {}", self.base_dir.display());
        println!("ocidir: {}", self.oci_dir.display());
        println!("fs driver: {}", self.fs_type);
        match self.fs_type {
            FsType::Btrfs => {
                let created = if self.lo_file.exists() {
                    "present"
                } else {
                    "absent"
                };
                println!("  loopback file: {} ({})", self.lo_file.display(), created);
                let mounted = if crate::storage::btrfs::is_mountpoint(&self.btrfs_mount) {
                    "mounted"
                } else {
                    "not mounted"
                };
                println!("  mountpoint: {} ({})", self.btrfs_mount.display(), mounted);
                println!("  volume size: {}", self.volume_size);
            }
            FsType::Zfs => println!("  Note zfs is not yet supported"),
            FsType::Lvm => println!("  Note LVM is not yet supported"),
            FsType::Vfs => {}
        }

        match record::load(&self.base_dir) {
            Ok(Some(rec)) => {
                let workdir = self.unpack_dir();
                if rec.digest.is_empty() {
                    println!("checkout: tag '{}' at {}", rec.tag, workdir.display());
                } else {
                    println!(
                        "checkout: tag '{}' (digest {}) at {}",
                        rec.tag,
                        rec.digest,
                        workdir.display()
                    );
                }
                if workdir.exists() {
                    let bytes = dir_size(&workdir);
                    println!("  working copy: {:.1} MiB", bytes as f64 / (1024.0 * 1024.0));
                } else {
                    println!("  working copy: missing on disk");
                }
            }
            Ok(None) => println!("checkout: none"),
            Err(e) => eprintln!("Error reading checkout state: {}", e),
        }
    }
}

/// Total size in bytes of all files under `dir`.
fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// Read the first config file that exists, returning its path and text.
fn read_config_file() -> Result<Option<(PathBuf, String)>> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        let text = fs::read_to_string(&local)?;
        return Ok(Some((local, text)));
    }

    if let Some(dir) = dirs::config_dir() {
        let user = dir.join(CONFIG_FILE);
        if user.exists() {
            let text = fs::read_to_string(&user)?;
            return Ok(Some((user, text)));
        }
    }

    Ok(None)
}
