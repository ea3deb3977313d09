//! Multi-architecture manifest list
//!
//! The per-platform digests must name manifests already pushed to the
//! registry by a multi-arch build; this crate only assembles and publishes
//! the list. The rendered form uses three-space indentation and a trailing
//! newline, and key order follows field order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest list {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed manifest list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid manifest list: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(
        rename = "os.version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_version: Option<String>,
    #[serde(
        rename = "os.features",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub os_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    pub media_type: String,
    pub manifests: Vec<PlatformManifest>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^sha256:[a-f0-9]{64}$").expect("valid digest regex"))
}

impl ManifestList {
    /// Docker manifest list over the given platform manifests
    pub fn new(manifests: Vec<PlatformManifest>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            media_type: MANIFEST_LIST_MEDIA_TYPE.to_string(),
            manifests,
            annotations: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let list: Self = serde_json::from_str(json)?;
        list.validate()?;
        Ok(list)
    }

    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::Invalid(format!(
                "unsupported schemaVersion {}",
                self.schema_version
            )));
        }

        let entry_type = match self.media_type.as_str() {
            MANIFEST_LIST_MEDIA_TYPE => MANIFEST_MEDIA_TYPE,
            OCI_INDEX_MEDIA_TYPE => OCI_MANIFEST_MEDIA_TYPE,
            other => {
                return Err(ManifestError::Invalid(format!(
                    "unsupported mediaType {}",
                    other
                )))
            }
        };

        if self.manifests.is_empty() {
            return Err(ManifestError::Invalid("no platform manifests".to_string()));
        }

        for (i, entry) in self.manifests.iter().enumerate() {
            if entry.media_type != entry_type {
                return Err(ManifestError::Invalid(format!(
                    "manifests[{}]: mediaType {} does not match {}",
                    i, entry.media_type, entry_type
                )));
            }
            if !digest_pattern().is_match(&entry.digest) {
                return Err(ManifestError::Invalid(format!(
                    "manifests[{}]: malformed digest {}",
                    i, entry.digest
                )));
            }
            if entry.size == 0 {
                return Err(ManifestError::Invalid(format!("manifests[{}]: zero size", i)));
            }
            if entry.platform.architecture.is_empty() || entry.platform.os.is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "manifests[{}]: platform needs architecture and os",
                    i
                )));
            }
        }

        Ok(())
    }

    /// A list with one platform gains nothing over a plain manifest
    pub fn is_single_platform(&self) -> bool {
        self.manifests.len() == 1
    }

    /// Renders the wire form sent to the registry
    pub fn render(&self) -> Result<String, ManifestError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amd64() -> PlatformManifest {
        PlatformManifest {
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            size: 527,
            digest: format!("sha256:{}", "a".repeat(64)),
            platform: Platform {
                architecture: "amd64".to_string(),
                os: "linux".to_string(),
                os_version: None,
                os_features: Vec::new(),
                variant: None,
                features: Vec::new(),
            },
            urls: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_render_shape() {
        let mut arm = amd64();
        arm.platform.architecture = "arm".to_string();
        arm.platform.variant = Some("v7".to_string());

        let rendered = ManifestList::new(vec![amd64(), arm]).render().unwrap();

        assert!(rendered.starts_with("{\n   \"schemaVersion\": 2,\n   \"mediaType\": "));
        assert!(rendered.ends_with("}\n"));
        assert!(rendered.contains("\"variant\": \"v7\""));
        // variant omitted when absent
        assert_eq!(rendered.matches("\"variant\"").count(), 1);
        let size_pos = rendered.find("\"size\"").unwrap();
        let digest_pos = rendered.find("\"digest\"").unwrap();
        assert!(size_pos < digest_pos);
    }

    #[test]
    fn test_validate_rejects_bad_digest() {
        let mut entry = amd64();
        entry.digest = "sha256:xyz".to_string();
        let err = ManifestList::new(vec![entry]).validate().unwrap_err();
        assert!(err.to_string().contains("malformed digest"));
    }

    #[test]
    fn test_validate_rejects_empty_list() {
        assert!(ManifestList::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mixed_media_types() {
        let mut entry = amd64();
        entry.media_type = OCI_MANIFEST_MEDIA_TYPE.to_string();
        assert!(ManifestList::new(vec![entry]).validate().is_err());
    }

    #[test]
    fn test_single_platform_flag() {
        let list = ManifestList::new(vec![amd64()]);
        assert!(list.validate().is_ok());
        assert!(list.is_single_platform());
    }

    #[test]
    fn test_optional_platform_fields_survive_render() {
        let digest = format!("sha256:{}", "b".repeat(64));
        let json = format!(
            r#"{{
   "schemaVersion": 2,
   "mediaType": "{OCI_INDEX_MEDIA_TYPE}",
   "manifests": [
      {{
         "mediaType": "{OCI_MANIFEST_MEDIA_TYPE}",
         "size": 1125,
         "digest": "{digest}",
         "platform": {{
            "architecture": "amd64",
            "os": "windows",
            "os.version": "10.0.17763.1879",
            "os.features": [
               "win32k"
            ]
         }},
         "annotations": {{
            "org.opencontainers.image.ref.name": "ltsc2019"
         }}
      }},
      {{
         "mediaType": "{OCI_MANIFEST_MEDIA_TYPE}",
         "size": 1125,
         "digest": "{digest}",
         "platform": {{
            "architecture": "arm64",
            "os": "linux",
            "variant": "v8",
            "features": [
               "sse4"
            ]
         }}
      }}
   ],
   "annotations": {{
      "org.opencontainers.image.created": "2024-05-01T00:00:00Z"
   }}
}}
"#
        );

        let list = ManifestList::from_json(&json).unwrap();
        let windows = &list.manifests[0].platform;
        assert_eq!(windows.os_version.as_deref(), Some("10.0.17763.1879"));
        assert_eq!(windows.os_features, vec!["win32k"]);
        assert_eq!(list.manifests[1].platform.features, vec!["sse4"]);
        assert_eq!(list.render().unwrap(), json);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ManifestList::from_file(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
