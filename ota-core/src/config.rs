/// Update configuration that can be tested independently
use serde::{Deserialize, Serialize};

/// Largest chunk moved from the network into flash in one slice.
pub const MAX_CHUNK_SIZE: usize = 1024;

const DEFAULT_MANIFEST_URL: &str =
    "https://api.github.com/repos/squid-baby/friyay-forever/releases/latest";

/// Which kind of endpoint `manifest_url` points at. Decides the request
/// headers; the body shape is detected from the payload itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ManifestSource {
    /// A plain `version.json` style manifest; the binary lives at `firmware_url`.
    Direct,
    /// A release listing with `tag_name` and named assets.
    ReleaseListing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OtaConfig {
    pub manifest_url: String,
    pub source: ManifestSource,
    /// Fixed binary location used with direct manifests.
    pub firmware_url: String,
    pub user_agent: String,

    pub manifest_timeout_secs: u32,
    pub download_timeout_secs: u32,
    pub max_firmware_size: usize,
    pub min_free_space: usize,
    pub chunk_size: usize,
    /// Sleep when the stream has nothing buffered.
    pub idle_delay_ms: u32,

    // Scheduled checks
    pub check_interval_hours: u32,
    pub check_hour: u8,
    pub unit_index: u8,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            source: ManifestSource::ReleaseListing,
            firmware_url: String::new(),
            user_agent: "ESP32-OTA-Updater".to_string(),
            manifest_timeout_secs: 15,
            download_timeout_secs: 180,
            max_firmware_size: 3_000_000,
            min_free_space: 500_000,
            chunk_size: MAX_CHUNK_SIZE,
            idle_delay_ms: 10,
            check_interval_hours: 24,
            check_hour: 3,
            unit_index: 0,
        }
    }
}

impl OtaConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.manifest_url.trim().is_empty() {
            return Err("manifest_url is empty".to_string());
        }
        if self.source == ManifestSource::Direct && self.firmware_url.trim().is_empty() {
            return Err("direct manifests need a firmware_url".to_string());
        }
        if self.manifest_timeout_secs == 0 || self.download_timeout_secs == 0 {
            return Err("timeouts must be non-zero".to_string());
        }
        Ok(())
    }

    /// Chunk size clamped to 1..=1024.
    pub fn chunk_len(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }

    pub fn manifest_timeout_ms(&self) -> u64 {
        u64::from(self.manifest_timeout_secs) * 1000
    }

    pub fn download_timeout_ms(&self) -> u64 {
        u64::from(self.download_timeout_secs) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = OtaConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: OtaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_defaults_match_device_limits() {
        let config = OtaConfig::default();
        assert_eq!(config.max_firmware_size, 3_000_000);
        assert_eq!(config.min_free_space, 500_000);
        assert_eq!(config.manifest_timeout_secs, 15);
        assert_eq!(config.download_timeout_ms(), 180_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: OtaConfig =
            serde_json::from_str(r#"{"manifest_url":"https://example.com/version.json","source":"Direct","firmware_url":"https://example.com/firmware.bin"}"#)
                .unwrap();
        assert_eq!(config.source, ManifestSource::Direct);
        assert_eq!(config.chunk_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_direct_source_requires_firmware_url() {
        let config = OtaConfig { source: ManifestSource::Direct, ..OtaConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_len_is_clamped() {
        let mut config = OtaConfig::default();
        config.chunk_size = 4096;
        assert_eq!(config.chunk_len(), 1024);
        config.chunk_size = 0;
        assert_eq!(config.chunk_len(), 1);
    }
}
