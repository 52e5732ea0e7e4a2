//! Read-only access to the OCI image layout.
//!
//! [`TagStore`] is the interface the rest of the system sees: list tags,
//! check existence, resolve a tag to its content digest. [`OciLayout`] is
//! the on-disk implementation over an image layout directory (`oci-layout`,
//! `index.json`, `blobs/<alg>/<hex>`). Nothing here writes layout metadata;
//! tags are only ever created through the external repack tool.

use std::fs;
use std::path::{Path, PathBuf};

use oci_spec::image::{Descriptor, ImageConfiguration, ImageIndex, ImageManifest, MediaType};
use sha2::{Digest, Sha256};

use crate::error::{Result, StorageError};

/// Annotation carrying a manifest's tag name in the image index.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Read-only view over the image store.
pub trait TagStore {
    /// All tag names in the store.
    fn list_tags(&self) -> Result<Vec<String>>;

    /// Whether `tag` exists. False when the store cannot be read at all,
    /// so a missing layout behaves like an empty one.
    fn tag_exists(&self, tag: &str) -> bool;

    /// Resolve `tag` to the digest (hex, no algorithm prefix) of its most
    /// recent non-empty layer.
    fn resolve_digest(&self, tag: &str) -> Result<String>;
}

/// An OCI image layout directory.
#[derive(Debug, Clone)]
pub struct OciLayout {
    root: PathBuf,
}

impl OciLayout {
    /// Wrap a layout directory. The directory is not touched until a query
    /// runs, so a not-yet-created layout is fine to hold.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check the layout has the three required pieces.
    pub fn validate(&self) -> Result<()> {
        if !self.root.join("oci-layout").exists() {
            return Err(StorageError::InvalidLayout(format!(
                "missing oci-layout file in {}",
                self.root.display()
            ))
            .into());
        }
        if !self.root.join("index.json").exists() {
            return Err(StorageError::InvalidLayout(format!(
                "missing index.json in {}",
                self.root.display()
            ))
            .into());
        }
        if !self.root.join("blobs").exists() {
            return Err(StorageError::InvalidLayout(format!(
                "missing blobs directory in {}",
                self.root.display()
            ))
            .into());
        }
        Ok(())
    }

    /// All layer digests of `tag` (hex, no prefix), bottom to top.
    ///
    /// This is the chain the snapshot driver materializes one subvolume
    /// per layer from.
    pub fn layer_digests(&self, tag: &str) -> Result<Vec<String>> {
        let manifest = self.resolve_manifest(tag)?;
        Ok(manifest
            .layers()
            .iter()
            .map(|l| hex_digest(&l.digest().to_string()))
            .collect())
    }

    /// Find the single manifest the index associates with `tag`.
    ///
    /// Zero matches is `SourceNotFound`; more than one is `AmbiguousTag`
    /// (a hard error, nothing guesses which manifest was meant).
    fn resolve_manifest(&self, tag: &str) -> Result<ImageManifest> {
        let index = self.load_index()?;

        let matches: Vec<&Descriptor> = index
            .manifests()
            .iter()
            .filter(|d| descriptor_ref_name(d) == Some(tag))
            .collect();

        if matches.is_empty() {
            return Err(StorageError::SourceNotFound(tag.to_string()).into());
        }
        if matches.len() > 1 {
            return Err(StorageError::AmbiguousTag(tag.to_string()).into());
        }

        let descriptor = matches[0];
        if descriptor.media_type() != &MediaType::ImageManifest {
            return Err(StorageError::InvalidLayout(format!(
                "tag '{}' does not point at an image manifest",
                tag
            ))
            .into());
        }

        self.load_manifest(&descriptor.digest().to_string())
    }

    fn load_index(&self) -> Result<ImageIndex> {
        let path = self.root.join("index.json");
        let text = fs::read_to_string(&path).map_err(|e| {
            StorageError::InvalidLayout(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            StorageError::InvalidLayout(format!("cannot parse {}: {}", path.display(), e)).into()
        })
    }

    fn load_manifest(&self, digest: &str) -> Result<ImageManifest> {
        let bytes = self.read_blob(digest)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::InvalidLayout(format!("cannot parse manifest {}: {}", digest, e)).into()
        })
    }

    fn load_config(&self, digest: &str) -> Result<ImageConfiguration> {
        let bytes = self.read_blob(digest)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::InvalidLayout(format!("cannot parse image config {}: {}", digest, e))
                .into()
        })
    }

    /// Read a blob and verify its content hashes to the requested digest.
    fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest);
        let bytes = fs::read(&path).map_err(|e| {
            StorageError::InvalidLayout(format!("cannot read blob {}: {}", path.display(), e))
        })?;

        let expected = hex_digest(digest);
        let actual = sha256_hex(&bytes);
        if actual != expected {
            return Err(StorageError::BlobHashMismatch {
                digest: expected,
                actual,
            }
            .into());
        }

        Ok(bytes)
    }

    /// Path of a blob addressed by digest ("sha256:hex" or bare hex).
    fn blob_path(&self, digest: &str) -> PathBuf {
        let parts: Vec<&str> = digest.split(':').collect();
        let (algorithm, hash) = if parts.len() == 2 {
            (parts[0], parts[1])
        } else {
            ("sha256", digest)
        };
        self.root.join("blobs").join(algorithm).join(hash)
    }
}

impl TagStore for OciLayout {
    fn list_tags(&self) -> Result<Vec<String>> {
        let index = self.load_index()?;
        Ok(index
            .manifests()
            .iter()
            .filter_map(|d| descriptor_ref_name(d).map(|s| s.to_string()))
            .collect())
    }

    fn tag_exists(&self, tag: &str) -> bool {
        match self.list_tags() {
            Ok(tags) => tags.iter().any(|t| t == tag),
            Err(_) => false,
        }
    }

    fn resolve_digest(&self, tag: &str) -> Result<String> {
        let manifest = self.resolve_manifest(tag)?;
        let config = self.load_config(&manifest.config().digest().to_string())?;

        // Non-empty history entries index the manifest's layer list; the
        // digest wanted is the last non-empty layer's.
        let mut digest: Option<String> = None;
        let mut layer_idx = 0usize;
        let history = config.history();
        for entry in history {
            if entry.empty_layer().unwrap_or(false) {
                continue;
            }
            let layer = manifest.layers().get(layer_idx).ok_or_else(|| {
                StorageError::InvalidLayout(format!(
                    "history of tag '{}' names more layers than the manifest has",
                    tag
                ))
            })?;
            digest = Some(hex_digest(&layer.digest().to_string()));
            layer_idx += 1;
        }

        digest.ok_or_else(|| StorageError::NoContentDigest(tag.to_string()).into())
    }
}

/// The tag name recorded on an index descriptor, if any.
fn descriptor_ref_name(descriptor: &Descriptor) -> Option<&str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|a| a.get(REF_NAME_ANNOTATION))
        .map(|s| s.as_str())
}

/// Strip the algorithm prefix from a digest string.
fn hex_digest(digest: &str) -> String {
    digest.split(':').last().unwrap_or(digest).to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_blob(root: &Path, bytes: &[u8]) -> String {
        let digest = sha256_hex(bytes);
        let dir = root.join("blobs/sha256");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(&digest), bytes).unwrap();
        digest
    }

    fn minimal_layout(root: &Path, index_json: &str) {
        fs::create_dir_all(root.join("blobs/sha256")).unwrap();
        fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        fs::write(root.join("index.json"), index_json).unwrap();
    }

    #[test]
    fn validate_reports_whats_missing() {
        let temp = TempDir::new().unwrap();
        let layout = OciLayout::new(temp.path());

        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("oci-layout"));

        fs::write(temp.path().join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("index.json"));

        fs::write(temp.path().join("index.json"), "{}").unwrap();
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("blobs"));

        fs::create_dir_all(temp.path().join("blobs/sha256")).unwrap();
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn blob_path_handles_prefixed_and_bare_digests() {
        let layout = OciLayout::new("/images/test");
        assert_eq!(
            layout.blob_path("sha256:abc123"),
            PathBuf::from("/images/test/blobs/sha256/abc123")
        );
        assert_eq!(
            layout.blob_path("abc123"),
            PathBuf::from("/images/test/blobs/sha256/abc123")
        );
    }

    #[test]
    fn read_blob_verifies_content_hash() {
        let temp = TempDir::new().unwrap();
        let layout = OciLayout::new(temp.path());

        let digest = write_blob(temp.path(), b"hello layout");
        assert_eq!(layout.read_blob(&digest).unwrap(), b"hello layout");

        // Tamper with the blob; the digest no longer matches.
        fs::write(temp.path().join("blobs/sha256").join(&digest), b"tampered").unwrap();
        let err = layout.read_blob(&digest).unwrap_err();
        assert!(err.to_string().contains("blob hash mismatch"));
    }

    #[test]
    fn missing_layout_reads_as_empty_store() {
        let layout = OciLayout::new("/nonexistent/layout");
        assert!(!layout.tag_exists("anything"));
        assert!(layout.list_tags().is_err());
    }

    #[test]
    fn list_tags_skips_unnamed_manifests() {
        let temp = TempDir::new().unwrap();
        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": "sha256:aaaa",
                    "size": 1,
                    "annotations": { REF_NAME_ANNOTATION: "web" }
                },
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": "sha256:bbbb",
                    "size": 1
                }
            ]
        });
        minimal_layout(temp.path(), &index.to_string());

        let layout = OciLayout::new(temp.path());
        assert_eq!(layout.list_tags().unwrap(), vec!["web".to_string()]);
        assert!(layout.tag_exists("web"));
        assert!(!layout.tag_exists("db"));
    }

    #[test]
    fn hex_digest_strips_algorithm() {
        assert_eq!(hex_digest("sha256:abc"), "abc");
        assert_eq!(hex_digest("abc"), "abc");
    }
}
