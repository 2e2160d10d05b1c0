// FreeRTOS hooks for the cooperative update loop

use esp_idf_hal::delay::FreeRtos;
use ota_core::io::Platform;

pub struct EspPlatform;

impl EspPlatform {
    /// True once the station interface has an IP address.
    pub fn has_ip() -> bool {
        unsafe {
            let mut ip_info: esp_idf_sys::esp_netif_ip_info_t = std::mem::zeroed();
            let netif = esp_idf_sys::esp_netif_get_handle_from_ifkey(b"WIFI_STA_DEF\0".as_ptr() as *const ::core::ffi::c_char);
            if !netif.is_null() {
                esp_idf_sys::esp_netif_get_ip_info(netif, &mut ip_info) == esp_idf_sys::ESP_OK
                    && ip_info.ip.addr != 0
            } else {
                false
            }
        }
    }

    pub fn feed_watchdog() {
        // ESP_ERR_NOT_FOUND when the task is not subscribed, which is fine
        unsafe {
            esp_idf_sys::esp_task_wdt_reset();
        }
    }
}

impl Platform for EspPlatform {
    fn network_connected(&self) -> bool {
        Self::has_ip()
    }

    fn uptime_ms(&self) -> u64 {
        let micros = unsafe { esp_idf_sys::esp_timer_get_time() };
        (micros / 1000) as u64
    }

    fn yield_now(&mut self) {
        Self::feed_watchdog();
        esp_idf_hal::task::do_yield();
    }

    fn idle(&mut self, ms: u32) {
        Self::feed_watchdog();
        FreeRtos::delay_ms(ms);
    }

    fn restart(&mut self) {
        log::info!("Restarting into new firmware");
        unsafe {
            esp_idf_sys::esp_restart();
        }
    }
}
