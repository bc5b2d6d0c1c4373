//! A second stage boot selector for dual-bank SPI flash.
//!
//! Two firmware images live in fixed banks of the flash.  On every reset the
//! selector picks the bank the persisted configuration prefers, verifies the
//! image there, falls back to the other bank if it is damaged, and records the
//! outcome.  The chosen image is then copied into RAM and its entry point
//! handed back to the platform to jump to.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[macro_use]
mod log;

mod config;
mod geometry;
mod image;
mod loader;
mod select;

use core::cell::RefCell;

use storage::Flash;

pub use config::{Bank, BootConfig, Record, SectorSelector, DEFAULT_CONFIG};
pub use geometry::{
    BootHeader, FlashGeometry, FlashInfo, FlashMode, FlashSpeed, FLASH_TABLE, PRIMARY_BANK,
    SECTOR_SIZE,
};
pub use image::{check_image, Image, ImageFormat, ImageHeader, Section, SectionIter};
pub use loader::{load_image, Ram};
pub use select::{select_boot_image, Attempt, BootReport};

type Result<T> = core::result::Result<T, Error>;

// Use the error kind to avoid this depending on the particular flash.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error {
    Flash(storage::Error),
    InvalidImage,
    /// Neither bank holds a usable image.
    NoImage,
    /// A section targets memory the platform cannot load into.
    InvalidLoad,
}

/// Convert the flash error into our error type.
impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}

/// Why the chip last came out of reset, as kept in RTC memory.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResetReason {
    PowerOn,
    Watchdog,
    Exception,
    SoftWatchdog,
    SoftRestart,
    DeepSleepAwake,
    External,
    Unknown(u32),
}

impl ResetReason {
    pub fn from_raw(raw: u32) -> ResetReason {
        match raw {
            0 => ResetReason::PowerOn,
            1 => ResetReason::Watchdog,
            2 => ResetReason::Exception,
            3 => ResetReason::SoftWatchdog,
            4 => ResetReason::SoftRestart,
            5 => ResetReason::DeepSleepAwake,
            6 => ResetReason::External,
            n => ResetReason::Unknown(n),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResetReason::PowerOn => "power on",
            ResetReason::Watchdog => "watchdog",
            ResetReason::Exception => "exception",
            ResetReason::SoftWatchdog => "soft watchdog",
            ResetReason::SoftRestart => "soft restart",
            ResetReason::DeepSleepAwake => "deep sleep wake",
            ResetReason::External => "external",
            ResetReason::Unknown(_) => "unknown",
        }
    }
}

/// The parts of the chip, outside of the flash contents, that the selector
/// touches.  Boards implement this over their registers, tests over plain
/// fields.
pub trait Hardware {
    fn reset_reason(&self) -> ResetReason;

    /// Bring up the console.  Not called after a soft restart, which leaves
    /// the console configured.
    fn init_console(&mut self);

    /// Tell the flash driver the size of the chip, once it is known.  Reads
    /// beyond the driver's idea of the size would otherwise fail on the larger
    /// parts.
    fn set_chip_size(&mut self, size: u32);
}

/// Run the whole second stage: choose an image, copy it to RAM, and return the
/// entry point.  The caller jumps there; on error it must halt instead.
pub fn boot<F: Flash, H: Hardware, R: Ram>(
    flash: &RefCell<F>,
    hw: &mut H,
    ram: &mut R,
) -> Result<u32> {
    let report = select_boot_image(flash, hw)?;
    load_image(flash, report.load_address, ram)
}
