//! Flash geometry
//!
//! The chip size is not probed.  Instead, the boot loader's own header at
//! offset 0 carries a size class, set when the boot loader was flashed.  The
//! class picks a row of a fixed table, which also gives the location of the
//! second bank.  The first bank is always at 0x1000, just after the boot
//! loader.
//!
//! The last three sectors of the chip hold the boot configuration:
//!
//! +-----+----------------------------------+
//! | n-1 | sector selector                  |
//! | n-2 | record, when the selector is set |
//! | n-3 | record, when the selector is 0   |
//! +-----+----------------------------------+

use core::cell::RefCell;

use storage::ReadFlash;

use crate::config::{Bank, SectorSelector};
use crate::image::{read_raw, ImageHeader};

/// Sector size, the same on all supported chips.
pub const SECTOR_SIZE: u32 = 0x1000;

/// Flash offset of the first bank.
pub const PRIMARY_BANK: u32 = 0x1000;

/// A row of the geometry table.
#[derive(Debug)]
pub struct FlashInfo {
    pub label: &'static str,
    /// Total size of the chip.
    pub size: u32,
    /// Flash offset of the second bank.
    pub secondary: u32,
}

/// Row used for classes beyond the table.
const UNKNOWN_CLASS: usize = 7;

/// Geometry by size class.
pub static FLASH_TABLE: [FlashInfo; 10] = [
    FlashInfo { label: "512KB", size: 0x80000, secondary: 0x41000 },
    FlashInfo { label: "256KB", size: 0x40000, secondary: 0x21000 },
    FlashInfo { label: "2MB", size: 0x200000, secondary: 0x81000 },
    FlashInfo { label: "1MB", size: 0x100000, secondary: 0x81000 },
    FlashInfo { label: "4MB", size: 0x400000, secondary: 0x81000 },
    FlashInfo { label: "2MB-c1", size: 0x200000, secondary: 0x101000 },
    FlashInfo { label: "4MB-c1", size: 0x400000, secondary: 0x101000 },
    FlashInfo { label: "unknown", size: 0x80000, secondary: 0x41000 },
    FlashInfo { label: "8MB", size: 0x800000, secondary: 0x101000 },
    FlashInfo { label: "16MB", size: 0x1000000, secondary: 0x101000 },
];

/// The geometry of the chip, fixed for the boot.
#[derive(Debug, Clone, Copy)]
pub struct FlashGeometry {
    info: &'static FlashInfo,
}

impl FlashGeometry {
    pub fn from_class(class: u8) -> FlashGeometry {
        let index = class as usize;
        let index = if index < FLASH_TABLE.len() { index } else { UNKNOWN_CLASS };
        FlashGeometry { info: &FLASH_TABLE[index] }
    }

    pub fn label(&self) -> &'static str {
        self.info.label
    }

    pub fn size(&self) -> u32 {
        self.info.size
    }

    pub fn secondary_bank(&self) -> u32 {
        self.info.secondary
    }

    /// Flash offset of a bank.
    pub fn bank_address(&self, bank: Bank) -> u32 {
        match bank {
            Bank::Primary => PRIMARY_BANK,
            Bank::Secondary => self.info.secondary,
        }
    }

    pub fn selector_address(&self) -> u32 {
        self.info.size - SECTOR_SIZE
    }

    /// Where the record lives, for a given selector.
    pub fn record_address(&self, selector: &SectorSelector) -> u32 {
        if selector.upper() {
            self.info.size - 2 * SECTOR_SIZE
        } else {
            self.info.size - 3 * SECTOR_SIZE
        }
    }
}

/// SPI mode, from the boot loader header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashMode {
    Qio,
    Qout,
    Dio,
    Dout,
    Unknown(u8),
}

impl FlashMode {
    pub fn label(&self) -> &'static str {
        match self {
            FlashMode::Qio => "QIO",
            FlashMode::Qout => "QOUT",
            FlashMode::Dio => "DIO",
            FlashMode::Dout => "DOUT",
            FlashMode::Unknown(_) => "unknown",
        }
    }
}

/// SPI clock, from the boot loader header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashSpeed {
    Mhz40,
    Mhz26,
    Mhz20,
    Mhz80,
    Unknown(u8),
}

impl FlashSpeed {
    pub fn label(&self) -> &'static str {
        match self {
            FlashSpeed::Mhz40 => "40MHz",
            FlashSpeed::Mhz26 => "26.7MHz",
            FlashSpeed::Mhz20 => "20MHz",
            FlashSpeed::Mhz80 => "80MHz",
            FlashSpeed::Unknown(_) => "unknown",
        }
    }
}

/// The flag bytes of the boot loader's header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootHeader {
    pub flags1: u8,
    pub flags2: u8,
}

impl BootHeader {
    /// Read the header at offset 0.  An unreadable header is treated as erased
    /// flash, which lands on the unknown geometry.
    pub fn read<F: ReadFlash>(flash: &RefCell<F>) -> BootHeader {
        match read_raw::<ImageHeader, F>(flash, 0) {
            Ok(header) => BootHeader {
                flags1: header.flags1,
                flags2: header.flags2,
            },
            Err(_) => {
                warn!("Unable to read boot header");
                BootHeader::erased()
            }
        }
    }

    pub fn erased() -> BootHeader {
        BootHeader {
            flags1: 0xff,
            flags2: 0xff,
        }
    }

    pub fn size_class(&self) -> u8 {
        self.flags2 >> 4
    }

    pub fn mode(&self) -> FlashMode {
        match self.flags1 {
            0 => FlashMode::Qio,
            1 => FlashMode::Qout,
            2 => FlashMode::Dio,
            3 => FlashMode::Dout,
            n => FlashMode::Unknown(n),
        }
    }

    pub fn speed(&self) -> FlashSpeed {
        match self.flags2 & 0x0f {
            0x0 => FlashSpeed::Mhz40,
            0x1 => FlashSpeed::Mhz26,
            0x2 => FlashSpeed::Mhz20,
            0xf => FlashSpeed::Mhz80,
            n => FlashSpeed::Unknown(n),
        }
    }

    pub fn geometry(&self) -> FlashGeometry {
        FlashGeometry::from_class(self.size_class())
    }
}
