/// Checks run before any firmware byte is requested
use crate::config::OtaConfig;
use crate::error::ErrorKind;
use crate::manifest::UpdateDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreflightValidator {
    min_free_space: usize,
    max_firmware_size: usize,
}

impl PreflightValidator {
    pub fn new(min_free_space: usize, max_firmware_size: usize) -> Self {
        Self { min_free_space, max_firmware_size }
    }

    pub fn from_config(config: &OtaConfig) -> Self {
        Self::new(config.min_free_space, config.max_firmware_size)
    }

    /// A missing declared size passes; the download response is the final
    /// authority on size.
    pub fn validate(&self, descriptor: &UpdateDescriptor, free_space: usize) -> Result<(), ErrorKind> {
        log::info!("Free update space: {} bytes", free_space);

        if free_space < self.min_free_space {
            log::error!(
                "Not enough space: {} bytes free, {} required",
                free_space,
                self.min_free_space
            );
            return Err(ErrorKind::InsufficientSpace);
        }

        if let Some(size) = descriptor.declared_size() {
            if size > self.max_firmware_size as u64 {
                log::error!(
                    "Declared firmware size {} exceeds {} byte limit",
                    size,
                    self.max_firmware_size
                );
                return Err(ErrorKind::FirmwareTooLarge);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{describe_direct, DirectManifest};

    fn descriptor(size: Option<u64>) -> UpdateDescriptor {
        describe_direct(
            DirectManifest {
                version: "1.0.0".into(),
                firmware_size: size,
                release_notes: None,
                critical: None,
                sha256: None,
            },
            "https://fw.example/firmware.bin",
        )
        .unwrap()
    }

    fn validator() -> PreflightValidator {
        PreflightValidator::from_config(&OtaConfig::default())
    }

    #[test]
    fn test_rejects_low_free_space() {
        assert_eq!(validator().validate(&descriptor(None), 100_000), Err(ErrorKind::InsufficientSpace));
        assert_eq!(validator().validate(&descriptor(None), 499_999), Err(ErrorKind::InsufficientSpace));
        assert!(validator().validate(&descriptor(None), 500_000).is_ok());
    }

    #[test]
    fn test_rejects_oversized_declared_image() {
        assert_eq!(
            validator().validate(&descriptor(Some(4_000_000)), 1_500_000),
            Err(ErrorKind::FirmwareTooLarge)
        );
        assert!(validator().validate(&descriptor(Some(3_000_000)), 1_500_000).is_ok());
    }

    #[test]
    fn test_space_is_checked_before_size() {
        assert_eq!(
            validator().validate(&descriptor(Some(4_000_000)), 10),
            Err(ErrorKind::InsufficientSpace)
        );
    }

    #[test]
    fn test_missing_declared_size_passes() {
        assert!(validator().validate(&descriptor(None), 1_000_000).is_ok());
    }
}
