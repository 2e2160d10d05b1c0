// OTA (Over-The-Air) update module

pub mod flash;
pub mod http;
pub mod platform;

use anyhow::{anyhow, Result};
use ota_core::{OtaConfig, UpdateManager};

pub use flash::EspFlashSlot;
pub use http::EspHttp;
pub use platform::EspPlatform;

// OTA update flow:
// 1. Check the manifest (scheduled or manual)
// 2. Preflight: network, free space, declared size
// 3. Stream firmware into the OTA partition
// 4. Verify integrity and set boot partition
// 5. Restart

pub type DeviceUpdateManager = UpdateManager<EspHttp, EspFlashSlot, EspPlatform>;

pub fn build_manager(config: &OtaConfig, current_version: &str) -> Result<DeviceUpdateManager> {
    config
        .validate()
        .map_err(|e| anyhow!("Invalid OTA config: {}", e))?;

    let flash = EspFlashSlot::new()?;
    Ok(UpdateManager::new(
        config.clone(),
        current_version,
        EspHttp::new(),
        flash,
        EspPlatform,
    ))
}
