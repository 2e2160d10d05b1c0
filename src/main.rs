use anyhow::Result;
use log::info;

#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // Binstart

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

mod clock;
mod config;
mod logging;
mod version;

#[cfg(target_os = "espidf")]
mod network;
#[cfg(target_os = "espidf")]
mod ota;

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sntp::EspSntp;
    use ota_core::{report, UpdateSchedule};

    use crate::network::WifiManager;
    use crate::ota::EspPlatform;

    esp_idf_svc::sys::link_patches();
    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    info!("Friyay OTA {}", version::version_info());
    info!("Free heap: {} bytes", unsafe { esp_idf_sys::esp_get_free_heap_size() });

    // Watch the main task, the update loop feeds it between slices
    unsafe {
        let add_result = esp_idf_sys::esp_task_wdt_add(std::ptr::null_mut());
        if add_result != esp_idf_sys::ESP_OK {
            log::warn!("Failed to add task to watchdog: {:?}", add_result);
        }
    }

    let config = config::load_or_default()?;
    if !logging::set_max_level_from_str(&config.log_level) {
        log::warn!("Unknown log level '{}', keeping default", config.log_level);
    }
    log::info!(
        "WiFi credentials: SSID='{}', Password={}",
        config.wifi_ssid,
        if config.wifi_password.is_empty() { "<empty>" } else { "<set>" }
    );

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();

    let mut wifi = WifiManager::new(
        peripherals.modem,
        sys_loop,
        nvs,
        config.wifi_ssid.clone(),
        config.wifi_password.clone(),
    )?;
    if let Err(e) = wifi.connect() {
        log::error!("WiFi connection failed: {:?}, will retry", e);
    }

    // Local time drives the daily check window
    let _sntp = EspSntp::new_default()?;

    let mut manager = ota::build_manager(&config.ota, version::FIRMWARE_VERSION)?;
    manager.set_progress_sink(|percent: u8| {
        if percent % 25 == 0 {
            log::info!("Installing update: {}%", percent);
        }
    });

    let mut schedule = UpdateSchedule::from_config(&config.ota);
    info!(
        "OTA {} - daily check at {:02}:00 local",
        if config.ota_enabled { "enabled" } else { "disabled" },
        schedule.check_hour()
    );

    let mut last_reconnect_secs = 0u64;
    loop {
        EspPlatform::feed_watchdog();

        let uptime_ms = ota_core::Platform::uptime_ms(manager.platform());
        wifi.reconnect_if_needed(uptime_ms / 1000, &mut last_reconnect_secs);

        let local = clock::local_time(config.utc_offset_minutes);
        if config.ota_enabled && wifi.is_connected() && schedule.is_due(uptime_ms, local) {
            schedule.mark_checked(uptime_ms);
            info!("Running scheduled update check");

            let available = manager.check_for_update();
            if let Some(notice) = report::announcement(manager.current_version(), manager.status()) {
                info!("{}", notice);
            } else if !available {
                log::debug!("{}", report::check_result(manager.current_version(), manager.status()));
            }

            if available && config.auto_install && !manager.perform_update() {
                log::error!("{}", report::install_failed(manager.status()));
            }
        }

        FreeRtos::delay_ms(1000);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    let config = config::load_or_default()?;
    logging::set_max_level_from_str(&config.log_level);

    info!("Friyay OTA {}", version::version_info());
    info!(
        "Manifest: {} ({:?}), daily check at {:02}:00 + unit {}",
        config.ota.manifest_url, config.ota.source, config.ota.check_hour, config.ota.unit_index
    );
    if let Some((hour, minute)) = clock::local_time(config.utc_offset_minutes) {
        info!("Local time {:02}:{:02}", hour, minute);
    }
    log::warn!("This firmware only runs on ESP-IDF targets; use the `ota` tool to inspect releases from a host");
    Ok(())
}
