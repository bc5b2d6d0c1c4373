//! Boot image selection.

use core::cell::RefCell;

use asraw::ToRaw;
use storage::Flash;

use crate::config::{Bank, BootConfig, Record, SectorSelector};
use crate::geometry::{BootHeader, FlashGeometry, SECTOR_SIZE};
use crate::image::{check_image, read_raw};
use crate::{Error, Hardware, ResetReason, Result};

/// One candidate that was checked.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Attempt {
    pub bank: Bank,
    /// Where the image was looked for.
    pub offset: u32,
    /// The load address, or why the image was rejected.
    pub result: Result<u32>,
}

/// The outcome of a successful selection.
#[derive(Debug)]
pub struct BootReport {
    /// Flash offset of the image to load.
    pub load_address: u32,
    /// The bank it came from.
    pub bank: Bank,
    /// The configuration as of this boot.
    pub config: BootConfig,
    pub geometry: FlashGeometry,
    /// False if the stored configuration was unusable and the default was
    /// substituted.
    pub config_valid: bool,
    /// The configuration was written back this boot.
    pub updated: bool,
    /// Candidates in the order they were tried.
    pub attempts: heapless::Vec<Attempt, 2>,
}

impl BootReport {
    pub fn booted_default(&self) -> bool {
        self.config.booting_default()
    }
}

/// Pick the image to boot.
///
/// The bank named by the stored configuration is tried first, and the other
/// one if that fails.  When the outcome differs from what the configuration
/// records, the configuration is written back.  Returns `Error::NoImage` if
/// neither bank is valid, in which case nothing is written.
pub fn select_boot_image<F: Flash, H: Hardware>(
    flash: &RefCell<F>,
    hw: &mut H,
) -> Result<BootReport> {
    let reason = hw.reset_reason();
    if reason != ResetReason::SoftRestart {
        hw.init_console();
    }
    info!("Boot selector, reset: {}", reason.label());

    let header = BootHeader::read(flash);
    let geometry = header.geometry();
    info!("Flash Size:   {}", geometry.label());
    info!("Flash Mode:   {}", header.mode().label());
    info!("Flash Speed:  {}", header.speed().label());
    hw.set_chip_size(geometry.size());

    let selector: SectorSelector = match read_raw(flash, geometry.selector_address()) {
        Ok(sel) => sel,
        Err(_) => {
            warn!("Unable to read sector selector");
            SectorSelector::erased()
        }
    };

    // The whole record sector is kept, as the whole sector gets rewritten.
    let record_address = geometry.record_address(&selector);
    let mut sector = [0xffu8; SECTOR_SIZE as usize];
    if flash
        .borrow_mut()
        .read(record_address as usize, &mut sector)
        .is_err()
    {
        warn!("Unable to read configuration at {:#x}", record_address);
        sector.fill(0xff);
    }

    let mut record: Record = asraw::decode(&sector).unwrap_or_else(Record::erased);
    let (mut config, config_valid) = match BootConfig::from_bits(record.config) {
        Some(config) => (config, true),
        None => {
            warn!("Invalid configuration, using default.");
            record = Record::erased();
            asraw::encode(&record, &mut sector).ok_or(storage::Error::OutOfBounds)?;
            (BootConfig::default(), false)
        }
    };

    let mut attempts = heapless::Vec::new();
    let default = config.default_bank();
    let (bank, load_address) = match try_bank(flash, &geometry, default, &mut attempts) {
        Ok(addr) => {
            config.set_booting_default(true);
            (default, addr)
        }
        Err(_) => {
            let alt = default.other();
            match try_bank(flash, &geometry, alt, &mut attempts) {
                Ok(addr) => {
                    config.set_booting_default(false);
                    (alt, addr)
                }
                Err(_) => {
                    warn!("Both roms are bad.");
                    return Err(Error::NoImage);
                }
            }
        }
    };

    let mut updated = false;
    if config.bits() != record.config {
        info!("Updating configuration.");
        record.config = config.bits();
        asraw::encode(&record, &mut sector).ok_or(storage::Error::OutOfBounds)?;
        match persist(flash, &geometry, selector.flipped(), &sector) {
            Ok(()) => updated = true,
            // The image is still good, boot it anyway.
            Err(_) => warn!("Unable to write configuration"),
        }
    }

    if config.booting_default() {
        info!("Booting rom {}, load addr {:#x}.", bank.number(), load_address);
    } else {
        info!("Booting backup rom {}, load addr {:#x}.", bank.number(), load_address);
    }

    Ok(BootReport {
        load_address,
        bank,
        config,
        geometry,
        config_valid,
        updated,
        attempts,
    })
}

/// Check the image in a bank, noting the attempt.
fn try_bank<F: Flash>(
    flash: &RefCell<F>,
    geometry: &FlashGeometry,
    bank: Bank,
    attempts: &mut heapless::Vec<Attempt, 2>,
) -> Result<u32> {
    let offset = geometry.bank_address(bank);
    let result = check_image(flash, offset);
    if result.is_err() {
        warn!("Rom {} at {:#x} is not bootable", bank.number(), offset);
    }
    // At most two banks are ever tried.
    let _ = attempts.push(Attempt {
        bank,
        offset,
        result,
    });
    result
}

/// Write the record sector to the slot `selector` names, then the selector.
/// The device must erase in units of exactly one configuration sector.
fn persist<F: Flash>(
    flash: &RefCell<F>,
    geometry: &FlashGeometry,
    selector: SectorSelector,
    sector: &[u8],
) -> Result<()> {
    let mut flash = flash.borrow_mut();
    if flash.erase_size() != SECTOR_SIZE as usize {
        return Err(storage::Error::NotAligned.into());
    }

    let record_address = geometry.record_address(&selector);
    flash.erase_sector((record_address / SECTOR_SIZE) as usize)?;
    flash.write(record_address as usize, sector)?;

    // Only now that the record is complete may the selector move.
    let selector_address = geometry.selector_address();
    flash.erase_sector((selector_address / SECTOR_SIZE) as usize)?;
    flash.write(selector_address as usize, &selector.to_raw())?;

    Ok(())
}
