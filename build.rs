use std::env;
use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF; host builds only compile the stub binary
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();

        // Add crash log helper for better panic diagnostics
        println!("cargo:rustc-link-arg=-Wl,--undefined=esp_backtrace_print_app_description");
    }

    println!("cargo:rerun-if-changed=wifi_config.h");
    println!("cargo:rerun-if-env-changed=FIRMWARE_VERSION");
    println!("cargo:rerun-if-env-changed=OTA_MANIFEST_URL");

    // Read WiFi configuration if it exists
    let wifi_config_path = "wifi_config.h";
    if Path::new(wifi_config_path).exists() {
        let contents = fs::read_to_string(wifi_config_path)?;

        // Parse SSID
        if let Some(ssid) = define_value(&contents, "WIFI_SSID") {
            println!("cargo:rustc-env=WIFI_SSID={}", ssid);
        }

        // Parse Password
        if let Some(pass) = define_value(&contents, "WIFI_PASSWORD") {
            println!("cargo:rustc-env=WIFI_PASSWORD={}", pass);
        }
    } else {
        // Use empty defaults if no config file
        println!("cargo:rustc-env=WIFI_SSID=");
        println!("cargo:rustc-env=WIFI_PASSWORD=");
        println!("cargo:warning=wifi_config.h not found! Copy wifi_config.h.example to wifi_config.h and add your credentials.");
    }

    // Release pipelines set FIRMWARE_VERSION; local builds report "unknown"
    let firmware_version = env::var("FIRMWARE_VERSION").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=FIRMWARE_VERSION={}", firmware_version);

    let manifest_url = env::var("OTA_MANIFEST_URL").unwrap_or_default();
    println!("cargo:rustc-env=OTA_MANIFEST_URL={}", manifest_url);

    Ok(())
}

fn define_value<'a>(contents: &'a str, name: &str) -> Option<&'a str> {
    let define = format!("#define {}", name);
    contents
        .lines()
        .find(|l| l.trim_start().starts_with(&define))
        .and_then(|l| l.split('"').nth(1))
}
