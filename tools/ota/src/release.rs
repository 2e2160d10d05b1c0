//! `version.json` generation for a firmware build.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Works both as a direct manifest and as the `version.json` release asset.
#[derive(Debug, Serialize)]
pub struct ReleaseMetadata {
    pub version: String,
    pub firmware_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    pub critical: bool,
    pub sha256: String,
}

impl ReleaseMetadata {
    pub fn for_image(image: &[u8], version: &str, notes: Option<String>, critical: bool) -> Self {
        Self {
            version: ota_core::version::strip_tag_prefix(version).to_string(),
            firmware_size: image.len() as u64,
            release_notes: notes.filter(|n| !n.trim().is_empty()),
            critical,
            sha256: format!("{:x}", Sha256::digest(image)),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_core::manifest::ManifestDocument;

    #[test]
    fn test_metadata_strips_tag_prefix_and_hashes_image() {
        let meta = ReleaseMetadata::for_image(b"abc", "v1.4.0", Some("Fixes".into()), false);
        assert_eq!(meta.version, "1.4.0");
        assert_eq!(meta.firmware_size, 3);
        assert_eq!(
            meta.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_blank_notes_are_omitted() {
        let meta = ReleaseMetadata::for_image(b"abc", "1.0.0", Some("  ".into()), true);
        let json = meta.to_json().unwrap();
        assert!(!json.contains("release_notes"));
        assert!(json.contains("\"critical\": true"));
    }

    #[test]
    fn test_generated_file_is_accepted_as_direct_manifest() {
        let meta = ReleaseMetadata::for_image(&[0u8; 16], "2.0.1", None, false);
        let doc = ManifestDocument::parse(meta.to_json().unwrap().as_bytes()).unwrap();
        assert!(matches!(doc, ManifestDocument::Direct(ref m) if m.version == "2.0.1" && m.firmware_size == Some(16)));
    }
}
