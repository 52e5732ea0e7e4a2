//! Integration tests for OCI image layout queries.
//!
//! Each test builds a real layout on disk (content-addressed blobs,
//! manifests, index) and queries it through the public API.

mod helpers;

use std::fs;

use helpers::*;
use laminate::error::{Error, StorageError};
use laminate::oci::{OciLayout, TagStore};

#[test]
fn lists_tags_in_index_order() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("base", &[layer("base files")])
        .add_tag("web", &[layer("web files")])
        .finish();

    let store = OciLayout::new(root);
    assert_eq!(store.list_tags().unwrap(), vec!["base", "web"]);
    assert!(store.tag_exists("base"));
    assert!(!store.tag_exists("db"));
}

#[test]
fn a_freshly_initialized_layout_is_valid_and_empty() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir()).finish();

    assert_file_exists(&root.join("oci-layout"));
    assert_file_exists(&root.join("index.json"));
    assert_dir_exists(&root.join("blobs/sha256"));

    let store = OciLayout::new(root);
    assert!(store.validate().is_ok());
    assert!(store.list_tags().unwrap().is_empty());
}

#[test]
fn resolves_the_last_non_empty_layer() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag(
            "web",
            &[
                Hist::Empty,
                layer("bottom layer"),
                Hist::Empty,
                layer("top layer"),
                Hist::Empty,
            ],
        )
        .finish();

    let store = OciLayout::new(root);
    let digest = store.resolve_digest("web").unwrap();
    assert_eq!(digest, sha256_hex(b"top layer"));
}

#[test]
fn layer_digests_follow_manifest_order() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("web", &[layer("bottom layer"), Hist::Empty, layer("top layer")])
        .finish();

    let store = OciLayout::new(root);
    assert_eq!(
        store.layer_digests("web").unwrap(),
        vec![sha256_hex(b"bottom layer"), sha256_hex(b"top layer")]
    );
}

#[test]
fn an_unknown_tag_is_source_not_found() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("base", &[layer("base files")])
        .finish();

    let store = OciLayout::new(root);
    let err = store.resolve_digest("ghost").unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::SourceNotFound(ref tag)) if tag == "ghost"
    ));
    assert_eq!(err.to_string(), "source not found: 'ghost'");
}

#[test]
fn a_duplicate_tag_is_ambiguous() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("app", &[layer("first build")])
        .add_tag("app", &[layer("second build")])
        .finish();

    let store = OciLayout::new(root);
    let err = store.resolve_digest("app").unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::AmbiguousTag(ref tag)) if tag == "app"
    ));
}

#[test]
fn a_tag_with_only_empty_history_has_no_digest() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("hollow", &[Hist::Empty, Hist::Empty])
        .finish();

    let store = OciLayout::new(root);
    let err = store.resolve_digest("hollow").unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::NoContentDigest(ref tag)) if tag == "hollow"
    ));
    assert!(err.to_string().contains("no non-empty layer"));
}

#[test]
fn a_tampered_blob_fails_digest_resolution() {
    let env = TestEnv::new();
    let root = LayoutBuilder::new(env.oci_dir())
        .add_tag("web", &[layer("web files")])
        .finish();

    // Corrupt every blob; the first one read no longer hashes right.
    let blobs = root.join("blobs/sha256");
    for entry in fs::read_dir(&blobs).unwrap() {
        fs::write(entry.unwrap().path(), b"tampered").unwrap();
    }

    let store = OciLayout::new(root);
    let err = store.resolve_digest("web").unwrap_err();
    assert!(err.to_string().contains("blob hash mismatch"));
}
