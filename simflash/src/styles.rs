//! Flash styles
//!
//! The supported chips differ only in their size.  The boot loader's own
//! header, at offset 0, reports the size class in the high nibble of its
//! second flag byte, along with the SPI mode and speed.  Each style here builds
//! an erased device with that header already programmed.

use crate::{Result, SimFlash};

/// Sector size shared by all of the SPI flash parts.
pub const SECTOR_SIZE: usize = 0x1000;

/// SPI write granularity.
pub const WRITE_SIZE: usize = 4;

/// The configuration of a single flash chip.
pub struct ChipStyle {
    /// Size class reported in the boot header.
    pub class: u8,
    /// Actual size of the device.
    pub size: usize,
    /// SPI mode byte (flags1).
    pub mode: u8,
    /// SPI speed nibble.
    pub speed: u8,
}

impl ChipStyle {
    /// The boot loader header as it would be found at offset 0.
    pub fn boot_header(&self) -> [u8; 8] {
        [
            0xe9,
            1,
            self.mode,
            (self.class << 4) | (self.speed & 0x0f),
            0x00,
            0x00,
            0x10,
            0x40,
        ]
    }

    pub fn build(&self) -> Result<SimFlash> {
        let mut flash = SimFlash::new(1, WRITE_SIZE, SECTOR_SIZE, self.size / SECTOR_SIZE)?;
        flash.install(&self.boot_header(), 0)?;
        Ok(flash)
    }
}

pub static ESP_512K: ChipStyle = ChipStyle {
    class: 0,
    size: 0x80000,
    mode: 0,
    speed: 0,
};

pub static ESP_256K: ChipStyle = ChipStyle {
    class: 1,
    size: 0x40000,
    mode: 2,
    speed: 0,
};

pub static ESP_2M: ChipStyle = ChipStyle {
    class: 2,
    size: 0x200000,
    mode: 2,
    speed: 0x0f,
};

pub static ESP_1M: ChipStyle = ChipStyle {
    class: 3,
    size: 0x100000,
    mode: 3,
    speed: 0,
};

pub static ESP_4M: ChipStyle = ChipStyle {
    class: 4,
    size: 0x400000,
    mode: 0,
    speed: 0x0f,
};

/// The "c1" parts place the second bank at 1MB.
pub static ESP_2M_C1: ChipStyle = ChipStyle {
    class: 5,
    size: 0x200000,
    mode: 1,
    speed: 1,
};

pub static ESP_4M_C1: ChipStyle = ChipStyle {
    class: 6,
    size: 0x400000,
    mode: 2,
    speed: 2,
};

pub static ESP_8M: ChipStyle = ChipStyle {
    class: 8,
    size: 0x800000,
    mode: 2,
    speed: 0,
};

pub static ESP_16M: ChipStyle = ChipStyle {
    class: 9,
    size: 0x1000000,
    mode: 2,
    speed: 0,
};

/// A size class the boot loader does not know.  It is treated as 512KB.
pub static ESP_UNKNOWN: ChipStyle = ChipStyle {
    class: 0x0c,
    size: 0x80000,
    mode: 7,
    speed: 5,
};

/// All of the known chips.
pub static ALL_CHIPS: [&ChipStyle; 9] = [
    &ESP_512K, &ESP_256K, &ESP_2M, &ESP_1M, &ESP_4M, &ESP_2M_C1, &ESP_4M_C1, &ESP_8M, &ESP_16M,
];

/// An iterator that builds each of the known chips in turn.
pub fn all_chips() -> impl Iterator<Item = (&'static ChipStyle, Result<SimFlash>)> {
    ALL_CHIPS.iter().map(|style| (*style, style.build()))
}
