// Flash transactions on the spare OTA partition using the ESP-IDF OTA API

use anyhow::Result;
use esp_idf_svc::ota::{EspOta, EspOtaUpdate};
use esp_idf_sys::{esp_ota_get_next_update_partition, EspError};
use ota_core::io::{FlashFault, FlashTarget, FlashUpdate};

pub struct EspFlashSlot {
    ota: EspOta,
}

impl EspFlashSlot {
    pub fn new() -> Result<Self> {
        let mut ota = EspOta::new()?;

        // Confirm the image we booted so the bootloader does not roll back
        match ota.mark_running_slot_valid() {
            Ok(()) => log::info!("Running firmware marked valid"),
            Err(e) => log::warn!("Could not mark running slot valid: {:?}", e),
        }

        if let Ok(slot) = ota.get_running_slot() {
            log::info!("Running partition: {:?}", slot.label);
        }

        Ok(Self { ota })
    }
}

impl FlashTarget for EspFlashSlot {
    type Update<'a> = EspSlotUpdate<'a>;

    fn free_space(&self) -> usize {
        // Get the next OTA partition
        let partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if partition.is_null() {
            return 0;
        }
        unsafe { (*partition).size as usize }
    }

    fn begin(&mut self, size: usize) -> Result<EspSlotUpdate<'_>, FlashFault> {
        let capacity = self.free_space();
        if capacity == 0 {
            return Err(FlashFault("no OTA update partition".to_string()));
        }
        if size > capacity {
            return Err(FlashFault(format!("image of {} bytes exceeds {} byte partition", size, capacity)));
        }

        let update = self.ota.initiate_update().map_err(flash_fault)?;
        log::info!("OTA transaction opened for {} bytes", size);
        Ok(EspSlotUpdate { update })
    }
}

pub struct EspSlotUpdate<'a> {
    update: EspOtaUpdate<'a>,
}

impl FlashUpdate for EspSlotUpdate<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize, FlashFault> {
        // The io::Write impl reports how many bytes esp_ota_write took
        embedded_svc::io::Write::write(&mut self.update, data).map_err(|e| FlashFault(format!("{:?}", e)))
    }

    fn finalize(self) -> Result<(), FlashFault> {
        // esp_ota_end validates the image, then the boot partition is switched
        self.update.complete().map_err(flash_fault)
    }

    fn abort(self) {
        if let Err(e) = self.update.abort() {
            log::warn!("OTA abort reported {:?}", e);
        }
    }
}

fn flash_fault(e: EspError) -> FlashFault {
    FlashFault(format!("{:?}", e))
}
