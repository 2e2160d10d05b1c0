//! Release metadata: fetching and normalizing manifests.
//!
//! Two payload shapes are accepted and both become one [`UpdateDescriptor`]:
//!
//! - a direct manifest: `{version, firmware_size?, release_notes?, critical?, sha256?}`
//!   with the binary at the configured `firmware_url`
//! - a release listing: `{tag_name, body?, assets: [{name, browser_download_url, size}]}`
//!   carrying a `firmware.bin` asset and optionally a `version.json` asset
//!   with extra metadata
//!
//! Shape detection is done on the parsed payload by [`ManifestDocument::parse`]
//! and does not touch the network.

use serde::Deserialize;

use crate::config::{ManifestSource, OtaConfig};
use crate::error::ErrorKind;
use crate::io::{HttpConnection, HttpRequest, Platform};
use crate::version::{strip_tag_prefix, VersionTriple};

pub const FIRMWARE_ASSET: &str = "firmware.bin";
pub const METADATA_ASSET: &str = "version.json";

const MAX_NOTES_CHARS: usize = 200;
const MANIFEST_BODY_LIMIT: usize = 32 * 1024;
const METADATA_BODY_LIMIT: usize = 4 * 1024;

const RELEASE_ACCEPT: &str = "application/vnd.github.v3+json";

/// Normalized view of the latest release. Built once per successful fetch
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor {
    version: VersionTriple,
    version_label: String,
    firmware_url: String,
    declared_size: Option<u64>,
    release_notes: String,
    critical: bool,
    sha256: Option<String>,
}

impl UpdateDescriptor {
    pub fn version(&self) -> VersionTriple {
        self.version
    }

    /// Version as published, without a leading `v`.
    pub fn version_label(&self) -> &str {
        &self.version_label
    }

    pub fn firmware_url(&self) -> &str {
        &self.firmware_url
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// At most 200 characters.
    pub fn release_notes(&self) -> &str {
        &self.release_notes
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Expected SHA-256 of the image, lowercase hex.
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DirectManifest {
    pub version: String,
    #[serde(default)]
    pub firmware_size: Option<u64>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub critical: Option<bool>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseListing {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseListing {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Contents of a `version.json` release asset. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VersionMetadata {
    #[serde(default)]
    pub critical: Option<bool>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestDocument {
    Direct(DirectManifest),
    Release(ReleaseListing),
}

impl ManifestDocument {
    /// Picks the shape from the top-level fields: `tag_name` means a release
    /// listing, `version` a direct manifest.
    pub fn parse(body: &[u8]) -> Result<Self, ErrorKind> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ErrorKind::parse(e.to_string()))?;

        let Some(object) = value.as_object() else {
            return Err(ErrorKind::parse("manifest is not a JSON object"));
        };

        if object.contains_key("tag_name") {
            serde_json::from_value(value)
                .map(ManifestDocument::Release)
                .map_err(|e| ErrorKind::parse(e.to_string()))
        } else if object.contains_key("version") {
            serde_json::from_value(value)
                .map(ManifestDocument::Direct)
                .map_err(|e| ErrorKind::parse(e.to_string()))
        } else {
            Err(ErrorKind::parse("no tag_name or version field"))
        }
    }
}

/// Descriptor for a direct manifest whose binary lives at `firmware_url`.
pub fn describe_direct(manifest: DirectManifest, firmware_url: &str) -> Result<UpdateDescriptor, ErrorKind> {
    if firmware_url.trim().is_empty() {
        return Err(ErrorKind::NoAssetFound);
    }
    let label = manifest.version.trim().to_string();
    Ok(UpdateDescriptor {
        version: VersionTriple::parse(&label),
        version_label: label,
        firmware_url: firmware_url.to_string(),
        declared_size: manifest.firmware_size,
        release_notes: truncate_notes(manifest.release_notes.as_deref().unwrap_or_default()),
        critical: manifest.critical.unwrap_or(false),
        sha256: normalize_digest(manifest.sha256),
    })
}

/// Descriptor for a release listing, plus the `version.json` URL if the
/// release has one. The firmware asset is mandatory.
pub fn describe_release(listing: &ReleaseListing) -> Result<(UpdateDescriptor, Option<String>), ErrorKind> {
    let firmware = listing.asset(FIRMWARE_ASSET).ok_or(ErrorKind::NoAssetFound)?;
    let label = strip_tag_prefix(&listing.tag_name).to_string();

    let descriptor = UpdateDescriptor {
        version: VersionTriple::parse(&label),
        version_label: label,
        firmware_url: firmware.browser_download_url.clone(),
        declared_size: firmware.size,
        release_notes: truncate_notes(listing.body.as_deref().unwrap_or_default()),
        critical: false,
        sha256: None,
    };
    let metadata_url = listing
        .asset(METADATA_ASSET)
        .map(|asset| asset.browser_download_url.clone());

    Ok((descriptor, metadata_url))
}

/// Folds `version.json` fields into a release descriptor. The listing's own
/// notes win when both exist.
pub fn merge_metadata(descriptor: UpdateDescriptor, metadata: VersionMetadata) -> UpdateDescriptor {
    let release_notes = match metadata.release_notes {
        Some(notes) if descriptor.release_notes.is_empty() => truncate_notes(&notes),
        _ => descriptor.release_notes,
    };
    UpdateDescriptor {
        critical: metadata.critical.unwrap_or(descriptor.critical),
        sha256: normalize_digest(metadata.sha256).or(descriptor.sha256),
        release_notes,
        ..descriptor
    }
}

/// Longer than 200 characters: first 197 plus "...".
pub fn truncate_notes(notes: &str) -> String {
    if notes.chars().count() <= MAX_NOTES_CHARS {
        return notes.to_string();
    }
    let mut truncated: String = notes.chars().take(MAX_NOTES_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

fn normalize_digest(digest: Option<String>) -> Option<String> {
    digest
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
}

/// Retrieves the manifest configured in [`OtaConfig`] and normalizes it.
/// Whether the result is actually newer is the caller's decision.
pub struct ManifestClient<'a> {
    config: &'a OtaConfig,
}

impl<'a> ManifestClient<'a> {
    pub fn new(config: &'a OtaConfig) -> Self {
        Self { config }
    }

    pub fn fetch<C, P>(&self, conn: &mut C, platform: &mut P) -> Result<UpdateDescriptor, ErrorKind>
    where
        C: HttpConnection,
        P: Platform,
    {
        if !platform.network_connected() {
            log::warn!("Manifest check skipped: network not connected");
            return Err(ErrorKind::NetworkUnavailable);
        }

        log::info!("Checking for updates: {}", self.config.manifest_url);

        let timeout = self.config.manifest_timeout_ms();
        let user_agent = self.config.user_agent.as_str();
        let request = match self.config.source {
            ManifestSource::ReleaseListing => HttpRequest::get(&self.config.manifest_url, timeout)
                .header("Accept", RELEASE_ACCEPT)
                .header("User-Agent", user_agent),
            ManifestSource::Direct => HttpRequest::get(&self.config.manifest_url, timeout)
                .header("Cache-Control", "no-cache")
                .header("User-Agent", user_agent),
        };

        let status = conn
            .get(&request)
            .map_err(|e| ErrorKind::ConnectionFailed { reason: e.to_string() })?;
        if status != 200 {
            conn.close();
            log::error!("Manifest fetch failed: HTTP {}", status);
            return Err(ErrorKind::ManifestFetchFailed { code: status });
        }
        let body = conn.read_to_end(platform, MANIFEST_BODY_LIMIT, timeout, self.config.idle_delay_ms);
        conn.close();
        let body = body.map_err(|e| ErrorKind::ConnectionFailed { reason: e.to_string() })?;

        let descriptor = match ManifestDocument::parse(&body)? {
            ManifestDocument::Direct(manifest) => describe_direct(manifest, &self.config.firmware_url)?,
            ManifestDocument::Release(listing) => {
                let (descriptor, metadata_url) = describe_release(&listing)?;
                log::info!(
                    "Found {}: {} bytes",
                    FIRMWARE_ASSET,
                    descriptor.declared_size().unwrap_or_default()
                );
                match metadata_url {
                    Some(url) => match self.fetch_metadata(conn, platform, &url) {
                        Some(metadata) => merge_metadata(descriptor, metadata),
                        None => descriptor,
                    },
                    None => descriptor,
                }
            }
        };

        log::info!(
            "Latest release: {} (critical={})",
            descriptor.version_label(),
            descriptor.is_critical()
        );
        Ok(descriptor)
    }

    /// `version.json` is optional metadata: any failure is logged and ignored.
    fn fetch_metadata<C, P>(&self, conn: &mut C, platform: &mut P, url: &str) -> Option<VersionMetadata>
    where
        C: HttpConnection,
        P: Platform,
    {
        log::debug!("Fetching {} for metadata", METADATA_ASSET);

        let request = HttpRequest::get(url, self.config.manifest_timeout_ms())
            .header("User-Agent", &self.config.user_agent)
            .follow_redirects();

        let status = match conn.get(&request) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("{} fetch failed: {}", METADATA_ASSET, e);
                return None;
            }
        };
        if status != 200 {
            conn.close();
            log::warn!("{} fetch failed: HTTP {}", METADATA_ASSET, status);
            return None;
        }

        let body = conn.read_to_end(
            platform,
            METADATA_BODY_LIMIT,
            self.config.manifest_timeout_ms(),
            self.config.idle_delay_ms,
        );
        conn.close();
        let parsed = body
            .map_err(|e| e.to_string())
            .and_then(|body| serde_json::from_slice::<VersionMetadata>(&body).map_err(|e| e.to_string()));

        match parsed {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::warn!("{} parse failed: {}", METADATA_ASSET, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "tag_name": "v1.4.2",
        "body": "Fixes the timer flicker",
        "assets": [
            {"name": "version.json", "browser_download_url": "https://dl.example/version.json", "size": 80},
            {"name": "firmware.bin", "browser_download_url": "https://dl.example/firmware.bin", "size": 1048576}
        ]
    }"#;

    fn listing() -> ReleaseListing {
        match ManifestDocument::parse(LISTING.as_bytes()).unwrap() {
            ManifestDocument::Release(listing) => listing,
            other => panic!("expected release listing, got {:?}", other),
        }
    }

    #[test]
    fn test_detects_release_listing() {
        let listing = listing();
        assert_eq!(listing.tag_name, "v1.4.2");
        assert_eq!(listing.assets.len(), 2);
    }

    #[test]
    fn test_detects_direct_manifest() {
        let body = br#"{"version":"2.0.1","firmware_size":900000,"release_notes":"New LED modes","critical":true}"#;
        match ManifestDocument::parse(body).unwrap() {
            ManifestDocument::Direct(m) => {
                assert_eq!(m.version, "2.0.1");
                assert_eq!(m.firmware_size, Some(900_000));
                assert_eq!(m.critical, Some(true));
            }
            other => panic!("expected direct manifest, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_shapes_are_parse_errors() {
        assert!(matches!(ManifestDocument::parse(b"not json"), Err(ErrorKind::ManifestParseError { .. })));
        assert!(matches!(ManifestDocument::parse(b"[1,2]"), Err(ErrorKind::ManifestParseError { .. })));
        assert!(matches!(ManifestDocument::parse(br#"{"name":"x"}"#), Err(ErrorKind::ManifestParseError { .. })));
        assert!(matches!(ManifestDocument::parse(br#"{"tag_name":null}"#), Err(ErrorKind::ManifestParseError { .. })));
    }

    #[test]
    fn test_release_descriptor_strips_v_and_finds_assets() {
        let (descriptor, metadata_url) = describe_release(&listing()).unwrap();
        assert_eq!(descriptor.version(), VersionTriple::new(1, 4, 2));
        assert_eq!(descriptor.version_label(), "1.4.2");
        assert_eq!(descriptor.firmware_url(), "https://dl.example/firmware.bin");
        assert_eq!(descriptor.declared_size(), Some(1_048_576));
        assert_eq!(metadata_url.as_deref(), Some("https://dl.example/version.json"));
    }

    #[test]
    fn test_release_without_firmware_asset() {
        let mut listing = listing();
        listing.assets.retain(|a| a.name != FIRMWARE_ASSET);
        assert_eq!(describe_release(&listing).unwrap_err(), ErrorKind::NoAssetFound);
    }

    #[test]
    fn test_metadata_merge_prefers_listing_notes() {
        let (descriptor, _) = describe_release(&listing()).unwrap();
        let merged = merge_metadata(
            descriptor,
            VersionMetadata {
                critical: Some(true),
                release_notes: Some("from version.json".into()),
                sha256: Some("ABCDEF".into()),
            },
        );
        assert!(merged.is_critical());
        assert_eq!(merged.release_notes(), "Fixes the timer flicker");
        assert_eq!(merged.sha256(), Some("abcdef"));
    }

    #[test]
    fn test_metadata_notes_fill_empty_body() {
        let mut listing = listing();
        listing.body = None;
        let (descriptor, _) = describe_release(&listing).unwrap();
        let merged = merge_metadata(
            descriptor,
            VersionMetadata { release_notes: Some("from version.json".into()), ..Default::default() },
        );
        assert_eq!(merged.release_notes(), "from version.json");
        assert!(!merged.is_critical());
    }

    #[test]
    fn test_direct_descriptor_uses_configured_binary() {
        let manifest = DirectManifest {
            version: "3.1".into(),
            firmware_size: None,
            release_notes: None,
            critical: None,
            sha256: None,
        };
        let descriptor = describe_direct(manifest.clone(), "https://fw.example/firmware.bin").unwrap();
        assert_eq!(descriptor.version(), VersionTriple::new(3, 1, 0));
        assert_eq!(descriptor.firmware_url(), "https://fw.example/firmware.bin");
        assert_eq!(descriptor.declared_size(), None);
        assert_eq!(describe_direct(manifest, "").unwrap_err(), ErrorKind::NoAssetFound);
    }

    #[test]
    fn test_truncate_notes() {
        let short = "a".repeat(200);
        assert_eq!(truncate_notes(&short), short);

        let long = "b".repeat(250);
        let truncated = truncate_notes(&long);
        assert_eq!(truncated.chars().count(), 200);
        assert!(truncated.ends_with("..."));

        // Multibyte characters are counted as characters
        let emoji = "🎉".repeat(201);
        assert_eq!(truncate_notes(&emoji).chars().count(), 200);
    }
}
