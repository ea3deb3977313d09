//! The checked-in manifest list must survive parse and render unchanged

use infraboot::registry::manifest::{MANIFEST_LIST_MEDIA_TYPE, MANIFEST_MEDIA_TYPE};
use infraboot::registry::ManifestList;
use std::fs;
use std::path::Path;

fn fixture() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/manifests/manifest-list.json");
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_render_reproduces_fixture_exactly() {
    let original = fixture();
    let list = ManifestList::from_json(&original).unwrap();
    assert_eq!(list.render().unwrap(), original);
}

#[test]
fn test_fixture_platforms() {
    let list = ManifestList::from_json(&fixture()).unwrap();

    assert_eq!(list.schema_version, 2);
    assert_eq!(list.media_type, MANIFEST_LIST_MEDIA_TYPE);
    assert_eq!(list.manifests.len(), 9);
    assert!(!list.is_single_platform());
    assert!(list
        .manifests
        .iter()
        .all(|m| m.media_type == MANIFEST_MEDIA_TYPE && m.platform.os == "linux"));

    let arm_variants: Vec<&str> = list
        .manifests
        .iter()
        .filter(|m| m.platform.architecture == "arm")
        .filter_map(|m| m.platform.variant.as_deref())
        .collect();
    assert_eq!(arm_variants, vec!["v5", "v6", "v7"]);
}

#[test]
fn test_variant_omitted_when_absent() {
    let rendered = ManifestList::from_json(&fixture())
        .unwrap()
        .render()
        .unwrap();
    let s390x = rendered.find("\"s390x\"").unwrap();
    let tail = &rendered[s390x..];
    let platform_end = tail.find('}').unwrap();
    assert!(!tail[..platform_end].contains("variant"));
}
