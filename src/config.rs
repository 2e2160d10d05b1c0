use anyhow::Result;
use ota_core::{ManifestSource, OtaConfig};
use serde::{Deserialize, Serialize};

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "friyay";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,

    // "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,

    // Wall clock offset from UTC, for the scheduled check hour
    pub utc_offset_minutes: i16,

    // OTA settings
    pub ota_enabled: bool,
    /// Install right after a scheduled check finds a newer release.
    pub auto_install: bool,
    pub ota: OtaConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // Get credentials and endpoints from environment variables set by build.rs
        // These come from wifi_config.h which should NOT be committed to git
        let wifi_ssid = env!("WIFI_SSID");
        let wifi_password = env!("WIFI_PASSWORD");
        let manifest_url = env!("OTA_MANIFEST_URL");

        let mut ota = OtaConfig::default();
        if !manifest_url.is_empty() {
            ota.manifest_url = manifest_url.to_string();
            // A release API endpoint lists assets, anything else is a plain manifest
            if !manifest_url.contains("/releases/") {
                ota.source = ManifestSource::Direct;
                ota.firmware_url = sibling_url(manifest_url, "firmware.bin");
            }
        }

        Self {
            wifi_ssid: wifi_ssid.to_string(),
            wifi_password: wifi_password.to_string(),
            log_level: "info".to_string(),
            utc_offset_minutes: 0,
            ota_enabled: true,
            auto_install: true,
            ota,
        }
    }
}

impl DeviceConfig {
    #[cfg(target_os = "espidf")]
    pub fn save(&self) -> Result<()> {
        nvs::save(self)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn save(&self) -> Result<()> {
        log::debug!("No NVS on this target, configuration not persisted");
        Ok(())
    }
}

/// `https://host/path/version.json` -> `https://host/path/<name>`
fn sibling_url(url: &str, name: &str) -> String {
    match url.rfind('/') {
        Some(idx) => format!("{}/{}", &url[..idx], name),
        None => name.to_string(),
    }
}

pub fn load_or_default() -> Result<DeviceConfig> {
    match load() {
        Ok(mut config) => {
            log::info!("Loaded configuration from NVS");

            // If NVS has empty WiFi credentials, use the compiled-in ones
            if config.wifi_ssid.is_empty() || config.wifi_password.is_empty() {
                let default_config = DeviceConfig::default();
                log::warn!("NVS WiFi credentials empty, using compiled defaults: SSID='{}'", default_config.wifi_ssid);
                config.wifi_ssid = default_config.wifi_ssid;
                config.wifi_password = default_config.wifi_password;

                if let Err(e) = config.save() {
                    log::warn!("Failed to save updated config with WiFi credentials: {:?}", e);
                }
            }

            if let Err(e) = config.ota.validate() {
                log::warn!("Stored OTA config invalid ({}), using defaults", e);
                config.ota = DeviceConfig::default().ota;
            }

            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            let config = DeviceConfig::default();

            // Try to save default config to NVS for next time
            if let Err(save_err) = config.save() {
                log::warn!("Failed to save default config to NVS: {:?}", save_err);
            }

            Ok(config)
        }
    }
}

#[cfg(target_os = "espidf")]
fn load() -> Result<DeviceConfig> {
    nvs::load()
}

#[cfg(not(target_os = "espidf"))]
fn load() -> Result<DeviceConfig> {
    anyhow::bail!("no NVS on this target")
}

#[cfg(target_os = "espidf")]
mod nvs {
    use anyhow::Result;
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

    use super::{DeviceConfig, CONFIG_KEY, CONFIG_NAMESPACE};

    pub fn load() -> Result<DeviceConfig> {
        let nvs_partition = EspDefaultNvsPartition::take()?;
        let nvs = EspNvs::new(nvs_partition, CONFIG_NAMESPACE, true)?;

        let mut buf = vec![0u8; 2048]; // Max config size
        let data = nvs
            .get_blob(CONFIG_KEY, &mut buf)?
            .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

        Ok(serde_json::from_slice(data)?)
    }

    pub fn save(config: &DeviceConfig) -> Result<()> {
        let nvs_partition = EspDefaultNvsPartition::take()?;
        let mut nvs = EspNvs::new(nvs_partition, CONFIG_NAMESPACE, true)?;

        let data = serde_json::to_vec(config)?;
        nvs.set_blob(CONFIG_KEY, &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_url() {
        assert_eq!(
            sibling_url("https://ota.example/fw/version.json", "firmware.bin"),
            "https://ota.example/fw/firmware.bin"
        );
    }

    #[test]
    fn test_config_roundtrip_keeps_ota_settings() {
        let mut config = DeviceConfig::default();
        config.ota.unit_index = 3;
        let json = serde_json::to_vec(&config).unwrap();
        let restored: DeviceConfig = serde_json::from_slice(&json).unwrap();
        assert_eq!(restored.ota, config.ota);
    }

    #[test]
    fn test_host_falls_back_to_defaults() {
        let config = load_or_default().unwrap();
        assert!(config.ota_enabled);
        assert!(config.ota.validate().is_ok());
    }
}
