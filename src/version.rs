// Centralized version information

// Release version embedded at build time ("unknown" for local builds).
// This is what the update manager compares against the manifest.
pub const FIRMWARE_VERSION: &str = env!("FIRMWARE_VERSION");

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

// Version info string for logging
pub fn version_info() -> String {
    format!("Firmware: {}, Cargo: {}", FIRMWARE_VERSION, CARGO_VERSION)
}
