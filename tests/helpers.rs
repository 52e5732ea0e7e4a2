//! Shared test utilities for laminate tests.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use laminate::config::{Config, FsType};
use laminate::error::{Result, StorageError};
use laminate::runner::StepRunner;
use laminate::storage::ConfirmGate;
use laminate::unpack::{LayerTools, SyncOptions};

/// Test environment rooted in a temporary base directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_dir,
        }
    }

    /// A vfs configuration rooted at the test base directory.
    pub fn config(&self) -> Config {
        Config {
            base_dir: self.base_dir.clone(),
            oci_dir: self.oci_dir(),
            fs_type: FsType::Vfs,
            lo_file: self.base_dir.join("btrfs.img"),
            btrfs_mount: self.base_dir.join("btrfs"),
            volume_size: "20G".to_string(),
        }
    }

    pub fn oci_dir(&self) -> PathBuf {
        self.base_dir.join("oci")
    }

    pub fn workdir(&self) -> PathBuf {
        self.base_dir.join("unpacked")
    }
}

/// One history entry of a synthetic image.
pub enum Hist {
    /// A real layer with the given blob content.
    Layer(Vec<u8>),
    /// A history-only entry (`empty_layer: true`), no layer behind it.
    Empty,
}

pub fn layer(content: &str) -> Hist {
    Hist::Layer(content.as_bytes().to_vec())
}

/// Builds a real OCI image layout on disk: content-addressed blobs, config,
/// manifest and index, all hashed for real so verification passes.
/// Opening an existing layout appends to its index.
pub struct LayoutBuilder {
    root: PathBuf,
    manifests: Vec<serde_json::Value>,
}

impl LayoutBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        fs::create_dir_all(root.join("blobs/sha256")).expect("Failed to create blobs dir");
        fs::write(
            root.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .expect("Failed to write oci-layout");
        let manifests = match fs::read(root.join("index.json")) {
            Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|v| v.get("manifests").and_then(|m| m.as_array().cloned()))
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Self { root, manifests }
    }

    fn write_blob(&self, bytes: &[u8]) -> (String, u64) {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = format!("{:x}", hasher.finalize());
        fs::write(self.root.join("blobs/sha256").join(&digest), bytes)
            .expect("Failed to write blob");
        (digest, bytes.len() as u64)
    }

    /// Add a tagged image whose config history follows `entries` in order.
    pub fn add_tag(mut self, tag: &str, entries: &[Hist]) -> Self {
        let mut layers = Vec::new();
        let mut diff_ids = Vec::new();
        let mut history = Vec::new();

        for entry in entries {
            match entry {
                Hist::Layer(content) => {
                    let (digest, size) = self.write_blob(content);
                    layers.push(json!({
                        "mediaType": "application/vnd.oci.image.layer.v1.tar",
                        "digest": format!("sha256:{}", digest),
                        "size": size,
                    }));
                    diff_ids.push(format!("sha256:{}", digest));
                    history.push(json!({ "created_by": "test layer" }));
                }
                Hist::Empty => {
                    history.push(json!({ "created_by": "test env", "empty_layer": true }));
                }
            }
        }

        let config = json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": diff_ids },
            "history": history,
        });
        let config_bytes = serde_json::to_vec(&config).expect("Failed to encode config");
        let (config_digest, config_size) = self.write_blob(&config_bytes);

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": format!("sha256:{}", config_digest),
                "size": config_size,
            },
            "layers": layers,
        });
        let manifest_bytes = serde_json::to_vec(&manifest).expect("Failed to encode manifest");
        let (manifest_digest, manifest_size) = self.write_blob(&manifest_bytes);

        self.manifests.push(json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": format!("sha256:{}", manifest_digest),
            "size": manifest_size,
            "annotations": { "org.opencontainers.image.ref.name": tag },
        }));
        self
    }

    /// Write the index and return the layout root.
    pub fn finish(self) -> PathBuf {
        let index = json!({ "schemaVersion": 2, "manifests": self.manifests });
        fs::write(
            self.root.join("index.json"),
            serde_json::to_vec(&index).expect("Failed to encode index"),
        )
        .expect("Failed to write index.json");
        self.root
    }
}

/// Sha256 hex of arbitrary bytes, for asserting resolved digests.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Shared call log for the fakes below.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Layer tools that record calls and simulate umoci: unpack materializes a
/// bundle, repack registers the tag in the layout so later checkouts of it
/// resolve.
pub struct FakeTools {
    pub log: Log,
}

impl LayerTools for FakeTools {
    fn unpack(&self, _oci_dir: &Path, reference: &str, bundle: &Path) -> Result<()> {
        self.log.borrow_mut().push(format!("unpack {}", reference));
        let rootfs = bundle.join("rootfs");
        fs::create_dir_all(&rootfs)?;
        fs::write(rootfs.join(".unpacked_from"), reference)?;
        Ok(())
    }

    fn repack(&self, oci_dir: &Path, tag: &str, _bundle: &Path) -> Result<()> {
        self.log.borrow_mut().push(format!("repack {}", tag));
        LayoutBuilder::new(oci_dir)
            .add_tag(tag, &[layer(&format!("layer of {}", tag))])
            .finish();
        Ok(())
    }

    fn set_entrypoint(&self, _oci_dir: &Path, tag: &str, entrypoint: &str) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("entrypoint {} {}", tag, entrypoint));
        Ok(())
    }

    fn sync_tree(&self, src: &Path, dest: &Path, _opts: SyncOptions) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("sync {} {}", src.display(), dest.display()));
        Ok(())
    }
}

/// Confirmation gate with a canned answer.
pub struct FakeGate {
    pub answer: bool,
    pub prompts: Log,
}

impl ConfirmGate for FakeGate {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.answer
    }
}

/// Step runner that records what it was asked to do. When `fail_on` names a
/// command, running that command fails.
pub struct RecordingRunner {
    pub log: Log,
    pub fail_on: Option<String>,
}

impl StepRunner for RecordingRunner {
    fn expand_archive(&self, _rootfs: &Path, archive: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("expand {}", archive));
        Ok(())
    }

    fn run_command(&self, _rootfs: &Path, command: &str) -> Result<()> {
        if self.fail_on.as_deref() == Some(command) {
            return Err(StorageError::Inconsistent(format!("step '{}' failed", command)).into());
        }
        self.log.borrow_mut().push(format!("run {}", command));
        Ok(())
    }

    fn install(&self, _rootfs: &Path, source: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("install {}", source));
        Ok(())
    }

    fn set_entrypoint(&self, entrypoint: &str) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("entrypoint {}", entrypoint));
        Ok(())
    }
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a directory exists.
pub fn assert_dir_exists(path: &Path) {
    assert!(
        path.is_dir(),
        "Expected directory to exist: {}",
        path.display()
    );
}
