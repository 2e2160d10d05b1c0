use thiserror::Error;

/// Every way an update check or install can fail.
///
/// The `Display` text is what the UI and messaging layers show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("WiFi not connected")]
    NetworkUnavailable,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Manifest fetch failed: HTTP {code}")]
    ManifestFetchFailed { code: u16 },

    #[error("Manifest parse error: {reason}")]
    ManifestParseError { reason: String },

    #[error("No firmware.bin in release")]
    NoAssetFound,

    #[error("Insufficient space for update")]
    InsufficientSpace,

    #[error("Firmware too large")]
    FirmwareTooLarge,

    #[error("Invalid content length")]
    InvalidContentLength,

    #[error("Download failed: HTTP {code}")]
    DownloadFailed { code: u16 },

    #[error("Download timeout")]
    DownloadTimeout,

    #[error("Flash open failed: {reason}")]
    FlashOpenError { reason: String },

    #[error("Write error: {reason}")]
    WriteError { reason: String },

    #[error("Verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("No update available")]
    NoUpdateAvailable,
}

impl ErrorKind {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::ManifestParseError { reason: reason.into() }
    }
}
