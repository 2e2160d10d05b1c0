use anyhow::{bail, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// Station-mode WiFi used to reach the release server.
pub struct WifiManager {
    wifi: BlockingWifi<EspWifi<'static>>,
    pub ssid: String,
    reconnect_attempts: u32,
}

impl WifiManager {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        ssid: String,
        password: String,
    ) -> Result<Self> {
        log::info!("Initializing WiFi for SSID: '{}'", ssid);

        if ssid.is_empty() {
            log::error!("WiFi SSID is empty! Check wifi_config.h");
            bail!("WiFi SSID cannot be empty");
        }

        let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), nvs)?;

        let cfg = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid SSID format: {}", ssid))?,
            password: password
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
            auth_method: if password.is_empty() {
                log::warn!("WiFi password is empty, using open network");
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        esp_wifi.set_configuration(&cfg)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        Ok(Self {
            wifi,
            ssid,
            reconnect_attempts: 0,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        if !self.wifi.is_started()? {
            log::info!("Starting WiFi...");
            self.wifi.start()?;
        }

        log::info!("Connecting to {}...", self.ssid);
        self.wifi.connect()?;

        // DHCP can take a few seconds
        unsafe {
            esp_idf_sys::esp_task_wdt_reset();
        }
        self.wifi.wait_netif_up()?;
        unsafe {
            esp_idf_sys::esp_task_wdt_reset();
        }

        // Power save drops long TLS downloads
        unsafe {
            use esp_idf_sys::*;
            let result = esp_wifi_set_ps(wifi_ps_type_t_WIFI_PS_NONE);
            if result != ESP_OK {
                log::warn!("Failed to set WiFi power save mode: {:?}", result);
            }
        }

        let signal_strength = self.read_rssi().unwrap_or(-100);
        self.reconnect_attempts = 0;
        log::info!(
            "WiFi connected, IP: {}, signal: {} dBm",
            self.get_ip().unwrap_or_else(|| "?".to_string()),
            signal_strength
        );
        Ok(())
    }

    /// Called from the main loop. Backs off linearly up to one attempt a minute.
    pub fn reconnect_if_needed(&mut self, now_secs: u64, last_attempt_secs: &mut u64) {
        if self.is_connected() {
            return;
        }

        let backoff = (5 * (self.reconnect_attempts as u64 + 1)).min(60);
        if now_secs.saturating_sub(*last_attempt_secs) < backoff {
            return;
        }
        *last_attempt_secs = now_secs;
        self.reconnect_attempts += 1;

        log::warn!("WiFi down, reconnect attempt {}", self.reconnect_attempts);
        if let Err(e) = self.wifi.disconnect() {
            log::debug!("Disconnect before reconnect: {:?}", e);
        }
        if let Err(e) = self.connect() {
            log::warn!("WiFi reconnect failed: {:?}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.get_ip().is_some()
    }

    pub fn get_ip(&self) -> Option<String> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .filter(|info| !info.ip.is_unspecified())
            .map(|info| format!("{}", info.ip))
    }

    fn read_rssi(&self) -> Option<i8> {
        let mut info: esp_idf_sys::wifi_ap_record_t = unsafe { std::mem::zeroed() };
        let result = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut info) };
        (result == esp_idf_sys::ESP_OK).then_some(info.rssi)
    }
}
